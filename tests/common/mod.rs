//! Synthetic PS2 style disc images for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;

pub const SECTOR: usize = 2048;
pub const UDF_MARKER: &[u8] = b"*UDF DVD CGMS Info";
pub const UDF_MARKER_OFFSET: usize = 269;
pub const FOOTER_FILL: u8 = 0x5A;

enum Child {
    Dir(DirNode),
    File(String, Vec<u8>),
}

struct DirNode {
    name: String,
    children: Vec<Child>,
}

impl DirNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            children: Vec::new(),
        }
    }

    fn subdir(&mut self, name: &str) -> &mut DirNode {
        let index = self
            .children
            .iter()
            .position(|c| matches!(c, Child::Dir(d) if d.name == name));
        let index = match index {
            Some(index) => index,
            None => {
                self.children.push(Child::Dir(DirNode::new(name)));
                self.children.len() - 1
            }
        };
        match &mut self.children[index] {
            Child::Dir(dir) => dir,
            Child::File(..) => unreachable!(),
        }
    }
}

/// A built image plus the layout facts tests assert against.
pub struct BuiltImage {
    pub bytes: Vec<u8>,
    /// Record offset of every file and directory, keyed by `/`-joined path
    pub records: HashMap<String, u64>,
    /// Original LBA of every file
    pub lbas: HashMap<String, u32>,
    /// Byte offset where file payloads start
    pub data_start: u64,
    /// Directory records, root included
    pub total_inodes: u32,
}

/// Builds images laid out like a mastered PS2 disc: descriptors at sector 16,
/// directories from sector 18, one UDF marker sector per record plus one,
/// file payloads, then a footer sector.
pub struct IsoBuilder {
    root: DirNode,
    marker_count: Option<u32>,
    data_lba: Option<u32>,
}

impl IsoBuilder {
    pub fn new() -> Self {
        Self {
            root: DirNode::new(""),
            marker_count: None,
            data_lba: None,
        }
    }

    /// Adds a file; intermediate directories are created on demand.
    pub fn file(mut self, path: &str, content: &[u8]) -> Self {
        let mut parts: Vec<&str> = path.split('/').collect();
        let name = parts.pop().unwrap_or_default();
        let dir = parts
            .into_iter()
            .fold(&mut self.root, |dir, part| dir.subdir(part));
        dir.children
            .push(Child::File(name.to_string(), content.to_vec()));
        self
    }

    /// Adds an empty directory.
    pub fn dir(mut self, path: &str) -> Self {
        path.split('/')
            .fold(&mut self.root, |dir, part| dir.subdir(part));
        self
    }

    /// Overrides the number of UDF marker sectors written.
    pub fn marker_count(mut self, count: u32) -> Self {
        self.marker_count = Some(count);
        self
    }

    /// Places the first file payload at `lba` (if past the markers).
    pub fn data_lba(mut self, lba: u32) -> Self {
        self.data_lba = Some(lba);
        self
    }

    pub fn build(self) -> BuiltImage {
        // Directory sectors in pre-order, one sector each.
        let mut dir_lbas: HashMap<String, u32> = HashMap::new();
        let mut next_lba = 18u32;
        let mut total_inodes = 1u32;
        assign_dirs(&self.root, "", &mut dir_lbas, &mut next_lba, &mut total_inodes);

        let markers = self.marker_count.unwrap_or(total_inodes + 1);
        let marker_start = next_lba;
        let data_start = marker_start + total_inodes + 1;
        let mut file_lba = data_start.max(self.data_lba.unwrap_or(0));

        let mut lbas = HashMap::new();
        assign_files(&self.root, "", &mut lbas, &mut file_lba);

        let footer_lba = file_lba;
        let mut bytes = vec![0u8; (footer_lba as usize + 1) * SECTOR];

        write_descriptors(&mut bytes, footer_lba + 1);

        let mut records = HashMap::new();
        write_dir(
            &mut bytes,
            &self.root,
            "",
            18,
            18,
            &dir_lbas,
            &lbas,
            &mut records,
        );

        for i in 0..markers {
            let at = (marker_start + i) as usize * SECTOR + UDF_MARKER_OFFSET;
            bytes[at..at + UDF_MARKER.len()].copy_from_slice(UDF_MARKER);
        }

        let footer = footer_lba as usize * SECTOR;
        bytes[footer..].fill(FOOTER_FILL);

        BuiltImage {
            bytes,
            records,
            lbas,
            data_start: data_start as u64 * SECTOR as u64,
            total_inodes,
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn assign_dirs(
    dir: &DirNode,
    path: &str,
    dir_lbas: &mut HashMap<String, u32>,
    next_lba: &mut u32,
    total: &mut u32,
) {
    dir_lbas.insert(path.to_string(), *next_lba);
    *next_lba += 1;
    for child in &dir.children {
        *total += 1;
        if let Child::Dir(sub) = child {
            assign_dirs(sub, &join(path, &sub.name), dir_lbas, next_lba, total);
        }
    }
}

fn assign_files(dir: &DirNode, path: &str, lbas: &mut HashMap<String, u32>, next_lba: &mut u32) {
    for child in &dir.children {
        match child {
            Child::File(name, content) => {
                lbas.insert(join(path, name), *next_lba);
                *next_lba += content.len().div_ceil(SECTOR) as u32;
            }
            Child::Dir(sub) => assign_files(sub, &join(path, &sub.name), lbas, next_lba),
        }
    }
}

fn write_descriptors(bytes: &mut [u8], volume_size: u32) {
    let pvd = 16 * SECTOR;
    bytes[pvd] = 1;
    bytes[pvd + 1..pvd + 6].copy_from_slice(b"CD001");
    bytes[pvd + 6] = 1;
    write_both_endian_u32(&mut bytes[pvd + 80..], volume_size);
    write_dir_entry(bytes, pvd + 156, 18, SECTOR as u32, 0x02, &[0]);

    let term = 17 * SECTOR;
    bytes[term] = 255;
    bytes[term + 1..term + 6].copy_from_slice(b"CD001");
    bytes[term + 6] = 1;
}

#[allow(clippy::too_many_arguments)]
fn write_dir(
    bytes: &mut [u8],
    dir: &DirNode,
    path: &str,
    lba: u32,
    parent_lba: u32,
    dir_lbas: &HashMap<String, u32>,
    lbas: &HashMap<String, u32>,
    records: &mut HashMap<String, u64>,
) {
    let start = lba as usize * SECTOR;
    let offset = write_dir_entry(bytes, start, lba, SECTOR as u32, 0x02, &[0]);
    let mut offset = write_dir_entry(bytes, offset, parent_lba, SECTOR as u32, 0x02, &[1]);

    for child in &dir.children {
        match child {
            Child::File(name, content) => {
                let full = join(path, name);
                let file_lba = lbas[&full];
                records.insert(full, offset as u64);
                let on_disc = format!("{};1", name);
                offset = write_dir_entry(
                    bytes,
                    offset,
                    file_lba,
                    content.len() as u32,
                    0,
                    on_disc.as_bytes(),
                );
                let data = file_lba as usize * SECTOR;
                bytes[data..data + content.len()].copy_from_slice(content);
            }
            Child::Dir(sub) => {
                let full = join(path, &sub.name);
                let sub_lba = dir_lbas[&full];
                records.insert(full.clone(), offset as u64);
                offset = write_dir_entry(
                    bytes,
                    offset,
                    sub_lba,
                    SECTOR as u32,
                    0x02,
                    sub.name.as_bytes(),
                );
                write_dir(bytes, sub, &full, sub_lba, lba, dir_lbas, lbas, records);
            }
        }
    }
    assert!(offset <= start + SECTOR, "directory {path:?} overflows its sector");
}

pub fn write_both_endian_u32(buf: &mut [u8], value: u32) {
    buf[0..4].copy_from_slice(&value.to_le_bytes());
    buf[4..8].copy_from_slice(&value.to_be_bytes());
}

pub fn read_both_endian_u32(buf: &[u8]) -> (u32, u32) {
    (
        u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
        u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
    )
}

/// Writes a directory record at `offset` and returns the offset after it.
pub fn write_dir_entry(
    bytes: &mut [u8],
    offset: usize,
    lba: u32,
    size: u32,
    flags: u8,
    name: &[u8],
) -> usize {
    let mut len = 33 + name.len();
    if len % 2 == 1 {
        len += 1;
    }
    let rec = &mut bytes[offset..offset + len];
    rec.fill(0);
    rec[0] = len as u8;
    write_both_endian_u32(&mut rec[2..], lba);
    write_both_endian_u32(&mut rec[10..], size);
    rec[25] = flags;
    // Volume sequence number 1, both-endian
    rec[28..32].copy_from_slice(&[1, 0, 0, 1]);
    rec[32] = name.len() as u8;
    rec[33..33 + name.len()].copy_from_slice(name);
    offset + len
}
