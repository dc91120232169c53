//! Low-level right bits and the fixed abstract rights catalog.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::spec::DirSecurityError;

bitflags! {
    /// Set of file-system right bits (NTFS layout). Directory and file
    /// names share bits, e.g. `READ_DATA` and `LIST_DIRECTORY`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct RightFlags: u32 {
        const READ_DATA = 0x0000_0001;
        const LIST_DIRECTORY = 0x0000_0001;
        const WRITE_DATA = 0x0000_0002;
        const CREATE_FILES = 0x0000_0002;
        const APPEND_DATA = 0x0000_0004;
        const CREATE_DIRECTORIES = 0x0000_0004;
        const READ_EXTENDED_ATTRIBUTES = 0x0000_0008;
        const WRITE_EXTENDED_ATTRIBUTES = 0x0000_0010;
        const EXECUTE_FILE = 0x0000_0020;
        const TRAVERSE = 0x0000_0020;
        const DELETE_SUBDIRECTORIES_AND_FILES = 0x0000_0040;
        const READ_ATTRIBUTES = 0x0000_0080;
        const WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE = 0x0001_0000;
        const READ_PERMISSIONS = 0x0002_0000;
        const CHANGE_PERMISSIONS = 0x0004_0000;
        const TAKE_OWNERSHIP = 0x0008_0000;
        const SYNCHRONIZE = 0x0010_0000;

        const READ = 0x0002_0089;
        const WRITE = 0x0000_0116;
        const READ_AND_EXECUTE = 0x0002_00A9;
        const MODIFY = 0x0003_01BF;
        const FULL_CONTROL = 0x001F_01FF;
    }
}

/// Named low-level right. Several names share bits (`ReadData` and
/// `ListDirectory` are the same bit on files and directories).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumFileSystemRight {
    CreateFiles,
    WriteData,
    FullControl,
    ListDirectory,
    ReadData,
    Modify,
    Read,
    ReadAttributes,
    ReadExtendedAttributes,
    ReadPermissions,
    Traverse,
}

impl EnumFileSystemRight {
    pub fn flags(self) -> RightFlags {
        match self {
            Self::CreateFiles => RightFlags::CREATE_FILES,
            Self::WriteData => RightFlags::WRITE_DATA,
            Self::FullControl => RightFlags::FULL_CONTROL,
            Self::ListDirectory => RightFlags::LIST_DIRECTORY,
            Self::ReadData => RightFlags::READ_DATA,
            Self::Modify => RightFlags::MODIFY,
            Self::Read => RightFlags::READ,
            Self::ReadAttributes => RightFlags::READ_ATTRIBUTES,
            Self::ReadExtendedAttributes => RightFlags::READ_EXTENDED_ATTRIBUTES,
            Self::ReadPermissions => RightFlags::READ_PERMISSIONS,
            Self::Traverse => RightFlags::TRAVERSE,
        }
    }
}

/// Abstract capability granted by provisioning tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumAbstractRight {
    CreateFilesWriteData,
    FullControl,
    ListFolderReadData,
    Modify,
    Read,
    ReadAttributes,
    ReadExtendedAttributes,
    ReadPermissions,
    TraverseFolderExecuteFile,
}

impl EnumAbstractRight {
    pub const ALL: [Self; 9] = [
        Self::CreateFilesWriteData,
        Self::FullControl,
        Self::ListFolderReadData,
        Self::Modify,
        Self::Read,
        Self::ReadAttributes,
        Self::ReadExtendedAttributes,
        Self::ReadPermissions,
        Self::TraverseFolderExecuteFile,
    ];

    /// Catalog expansion, in application order.
    pub fn underlying_rights(self) -> &'static [EnumFileSystemRight] {
        use EnumFileSystemRight as R;
        match self {
            Self::CreateFilesWriteData => &[R::CreateFiles, R::WriteData],
            Self::FullControl => &[R::FullControl],
            Self::ListFolderReadData => &[R::ListDirectory, R::ReadData],
            Self::Modify => &[R::Modify],
            Self::Read => &[R::Read],
            Self::ReadAttributes => &[R::ReadAttributes],
            Self::ReadExtendedAttributes => &[R::ReadExtendedAttributes],
            Self::ReadPermissions => &[R::ReadPermissions],
            Self::TraverseFolderExecuteFile => &[R::Traverse],
        }
    }

    pub fn flags(self) -> RightFlags {
        self.underlying_rights()
            .iter()
            .fold(RightFlags::empty(), |acc, r| acc | r.flags())
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateFilesWriteData => "CreateFilesWriteData",
            Self::FullControl => "FullControl",
            Self::ListFolderReadData => "ListFolderReadData",
            Self::Modify => "Modify",
            Self::Read => "Read",
            Self::ReadAttributes => "ReadAttributes",
            Self::ReadExtendedAttributes => "ReadExtendedAttributes",
            Self::ReadPermissions => "ReadPermissions",
            Self::TraverseFolderExecuteFile => "TraverseFolderExecuteFile",
        }
    }
}

impl fmt::Display for EnumAbstractRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnumAbstractRight {
    type Err = DirSecurityError;

    fn from_str(txt: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(txt))
            .ok_or_else(|| DirSecurityError::InvalidArgument(format!("Unknown right: {txt:?}")))
    }
}
