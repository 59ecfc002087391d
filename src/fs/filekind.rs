use bincode::{Decode, Encode};

/// An enum to describe the type of a filesystem object.
///
/// The type of an object is fixed at creation. The discriminant doubles as
/// the on-disk type tag.
#[derive(Encode, Decode, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// a regular file
    #[default]
    Regular,
    /// a directory
    Directory,
    /// a symbolic link
    Symlink,
}

impl FileKind {
    pub fn is_dir(self) -> bool {
        self == FileKind::Directory
    }

    pub fn is_regular(self) -> bool {
        self == FileKind::Regular
    }
}
