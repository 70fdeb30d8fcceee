use crate::Iso;
use crate::facade::{self, Facade, FacadeKind, Node, NodeKind, ReadError};
use crate::record::{DirectoryRecord, Records};
use crate::susp;

/// How identifiers of the ISO 9660 directory hierarchy are turned into names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Naming {
    /// Identifiers as recorded, decoded as UTF-8.
    Plain,
    /// UCS-2 big-endian identifiers of a Joliet hierarchy.
    Joliet,
    /// Rock Ridge `NM` names, falling back to the plain identifier.
    RockRidge { skip: u8 },
}

/// Facade over an ISO 9660 directory hierarchy (primary or Joliet).
#[derive(Debug)]
pub struct DirectoryFacade<'i, 'a> {
    iso: &'i Iso<'a>,
    root: (u64, u64),
    naming: Naming,
}

impl<'i, 'a> DirectoryFacade<'i, 'a> {
    pub(crate) fn new(iso: &'i Iso<'a>, root: (u64, u64), naming: Naming) -> Self {
        Self { iso, root, naming }
    }

    fn node(&self, record: &DirectoryRecord<'_>) -> Result<Option<Node>, ReadError> {
        let block_size = self.iso.block_size();
        let mut kind = if record.is_current() {
            NodeKind::Current
        } else if record.is_parent() {
            NodeKind::Parent
        } else if record.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };

        let mut offset = record.data_block() * block_size;
        let mut len = record.data_len();

        let name = match self.naming {
            _ if matches!(kind, NodeKind::Current | NodeKind::Parent) => String::new(),
            Naming::Plain => String::from_utf8_lossy(record.identifier()).into_owned(),
            Naming::Joliet => facade::decode_utf16_be(record.identifier()),
            Naming::RockRidge { skip } => {
                let area = record.system_use().get(skip as usize..).unwrap_or(&[]);
                let entries = susp::entries(self.iso.data(), area, block_size)?;
                let rr = susp::rock_ridge(&entries);

                if rr.relocated {
                    return Ok(None);
                }

                if let Some(block) = rr.child_link {
                    kind = NodeKind::Directory;
                    offset = block * block_size;
                    len = self.directory_len(offset)?;
                }

                rr.name.unwrap_or_else(|| {
                    String::from_utf8_lossy(record.identifier()).into_owned()
                })
            }
        };

        Ok(Some(Node::new(name, kind, offset, len)))
    }

    /// Reads a directory's size from its own `.` record.
    fn directory_len(&self, offset: u64) -> Result<u64, ReadError> {
        let data = self.iso.data();
        let head = facade::extent(data, offset, DirectoryRecord::FIXED_LEN as u64 + 1)?;
        let len = head[0] as u64;
        let record = DirectoryRecord::parse(facade::extent(data, offset, len)?, offset)?;

        Ok(record.data_len())
    }
}

impl Facade for DirectoryFacade<'_, '_> {
    fn kind(&self) -> FacadeKind {
        match self.naming {
            Naming::Plain => FacadeKind::Iso9660,
            Naming::Joliet => FacadeKind::Joliet,
            Naming::RockRidge { .. } => FacadeKind::RockRidge,
        }
    }

    fn root(&self) -> Result<Node, ReadError> {
        let (block, len) = self.root;

        Ok(Node::new(
            String::new(),
            NodeKind::Directory,
            block * self.iso.block_size(),
            len,
        ))
    }

    fn list_children(&self, dir: &Node) -> Result<Vec<Node>, ReadError> {
        let data = facade::extent(self.iso.data(), dir.offset(), dir.len())?;
        let mut out = Vec::new();

        for record in Records::new(data, dir.offset()) {
            if let Some(node) = self.node(&record?)? {
                out.push(node);
            }
        }

        Ok(out)
    }
}
