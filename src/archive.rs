use std::fmt::Display;

use anyhow::{bail, ensure, Context};
use tracing::{debug, trace};

use crate::dos_time::FileTimes;

const RAR_SIGNATURE: &[u8] = b"Rar!\x1a\x07";
const SIGNATURE_SIZE: usize = 7;
const BASE_BLOCK_SIZE: usize = 7;

/// A u32 add-size follows the base block and data of that size follows the
/// header.
const LONG_BLOCK: u16 = 0x8000;

pub mod main_flags {
    pub const VOLUME: u16 = 0x0001;
    pub const COMMENT: u16 = 0x0002;
    pub const LOCK: u16 = 0x0004;
    pub const SOLID: u16 = 0x0008;
    pub const NEW_NUMBERING: u16 = 0x0010;
    pub const AV: u16 = 0x0020;
    pub const PROTECT: u16 = 0x0040;
    pub const PASSWORD: u16 = 0x0080;
    pub const FIRST_VOLUME: u16 = 0x0100;

    pub const NAMES: [(u16, &str); 9] = [
        (VOLUME, "VOLUME"),
        (COMMENT, "COMMENT"),
        (LOCK, "LOCK"),
        (SOLID, "SOLID"),
        (NEW_NUMBERING, "NEWNUMBERING"),
        (AV, "AV"),
        (PROTECT, "PROTECT"),
        (PASSWORD, "PASSWORD"),
        (FIRST_VOLUME, "FIRSTVOLUME"),
    ];
}

pub mod file_flags {
    pub const SPLIT_BEFORE: u16 = 0x0001;
    pub const SPLIT_AFTER: u16 = 0x0002;
    pub const PASSWORD: u16 = 0x0004;
    pub const COMMENT: u16 = 0x0008;
    pub const SOLID: u16 = 0x0010;
    pub const LARGE: u16 = 0x0100;
    pub const UNICODE: u16 = 0x0200;
    pub const SALT: u16 = 0x0400;
    pub const VERSION: u16 = 0x0800;
    pub const EXT_TIME: u16 = 0x1000;

    pub const WINDOW_MASK: u16 = 0x00e0;
    pub const DIRECTORY: u16 = 0x00e0;

    pub const NAMES: [(u16, &str); 10] = [
        (SPLIT_BEFORE, "SPLIT_BEFORE"),
        (SPLIT_AFTER, "SPLIT_AFTER"),
        (PASSWORD, "PASSWORD"),
        (COMMENT, "COMMENT"),
        (SOLID, "SOLID"),
        (LARGE, "LARGE"),
        (UNICODE, "UNICODE"),
        (SALT, "SALT"),
        (VERSION, "VERSION"),
        (EXT_TIME, "EXTTIME"),
    ];
}

/// Method byte of entries stored without compression.
pub const METHOD_STORE: u8 = 0x30;

fn flag_names(flags: u16, names: &[(u16, &str)]) -> String {
    let set: Vec<&str> = names
        .iter()
        .filter(|(flag, _)| flags & flag == *flag)
        .map(|(_, name)| *name)
        .collect();
    if set.is_empty() {
        "none".to_string()
    } else {
        set.join("|")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Rar15,
    Rar50,
    Future,
}

impl TryFrom<&[u8]> for Format {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        ensure!(
            bytes.len() >= SIGNATURE_SIZE && bytes.starts_with(RAR_SIGNATURE),
            "not a RAR archive: signature not found"
        );
        match bytes[SIGNATURE_SIZE - 1] {
            0 => Ok(Self::Rar15),
            1 => Ok(Self::Rar50),
            2 => Ok(Self::Future),
            b => bail!("not a RAR archive: unknown signature version {b:#x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    Mark,
    Main,
    File,
    Comment,
    Av,
    OldService,
    Protect,
    Sign,
    Service,
    EndArchive,
}

impl TryFrom<u8> for HeaderType {
    type Error = anyhow::Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x72 => Ok(Self::Mark),
            0x73 => Ok(Self::Main),
            0x74 => Ok(Self::File),
            0x75 => Ok(Self::Comment),
            0x76 => Ok(Self::Av),
            0x77 => Ok(Self::OldService),
            0x78 => Ok(Self::Protect),
            0x79 => Ok(Self::Sign),
            0x7a => Ok(Self::Service),
            0x7b => Ok(Self::EndArchive),
            b => bail!("unknown header type: {b:#x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    MsDos,
    Os2,
    Win32,
    Unix,
    MacOs,
    BeOs,
}

impl TryFrom<u8> for HostOs {
    type Error = anyhow::Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::MsDos),
            1 => Ok(Self::Os2),
            2 => Ok(Self::Win32),
            3 => Ok(Self::Unix),
            4 => Ok(Self::MacOs),
            5 => Ok(Self::BeOs),
            b => bail!("unknown host OS: {b}"),
        }
    }
}

pub struct BytesBuffer<'a> {
    bytes: &'a [u8],
    byte_cursor: usize,
}

impl<'a> BytesBuffer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            byte_cursor: 0,
        }
    }

    pub fn pop_byte(&mut self) -> Option<u8> {
        let ret = *self.bytes.get(self.byte_cursor)?;
        self.byte_cursor += 1;
        Some(ret)
    }

    pub fn pop_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let ret = self
            .bytes
            .get(self.byte_cursor..self.byte_cursor.checked_add(n)?)?;
        self.byte_cursor += n;
        Some(ret)
    }

    pub fn pop_u16(&mut self) -> Option<u16> {
        Some(u16::from_le_bytes(self.pop_bytes(2)?.try_into().ok()?))
    }

    pub fn pop_u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.pop_bytes(4)?.try_into().ok()?))
    }

    pub fn byte_cursor(&self) -> usize {
        self.byte_cursor
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.byte_cursor
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BaseBlock {
    head_crc: u16,
    header_type: HeaderType,
    flags: u16,
    head_size: u16,
}

impl BaseBlock {
    pub fn header_type(&self) -> HeaderType {
        self.header_type
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }
}

impl TryFrom<&[u8]> for BaseBlock {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let mut bytes = BytesBuffer::new(bytes);
        let head_crc = bytes.pop_u16().context("reading header CRC")?;
        let header_type: HeaderType = bytes
            .pop_byte()
            .context("reading header type")?
            .try_into()
            .context("parsing header type")?;
        let flags = bytes.pop_u16().context("reading header flags")?;
        let head_size = bytes.pop_u16().context("reading header size")?;
        ensure!(
            head_size as usize >= BASE_BLOCK_SIZE,
            "header size {head_size} is smaller than the base block"
        );
        Ok(Self {
            head_crc,
            header_type,
            flags,
            head_size,
        })
    }
}

impl Display for BaseBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CRC: {:#06x} Type: {:?} Flags: {:#06x} Size: {:#06x}",
            self.head_crc, self.header_type, self.flags, self.head_size
        )
    }
}

#[derive(Debug, Clone)]
pub struct MainHeader {
    base: BaseBlock,
    high_pos_av: u16,
    pos_av: u32,
}

impl MainHeader {
    fn parse(base: BaseBlock, bytes: &mut BytesBuffer<'_>) -> anyhow::Result<Self> {
        Ok(Self {
            base,
            high_pos_av: bytes.pop_u16().context("reading HighPosAV")?,
            pos_av: bytes.pop_u32().context("reading PosAV")?,
        })
    }

    pub fn flags(&self) -> u16 {
        self.base.flags
    }

    pub fn is_solid(&self) -> bool {
        self.flags() & main_flags::SOLID != 0
    }
}

impl Display for MainHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Main header {}", self.base)?;
        writeln!(
            f,
            "  HighPosAV: {:#06x} PosAV: {:#010x}",
            self.high_pos_av, self.pos_av
        )?;
        writeln!(
            f,
            "  Flags: {}",
            flag_names(self.flags(), &main_flags::NAMES)
        )
    }
}

#[derive(Debug, Clone)]
pub struct FileHeader<'a> {
    base: BaseBlock,
    pack_size: u64,
    unp_size: u64,
    host_os: HostOs,
    file_crc: u32,
    times: FileTimes,
    unp_ver: u8,
    method: u8,
    attr: u32,
    name: String,
    salt: Option<[u8; 8]>,
    data: &'a [u8],
}

impl<'a> FileHeader<'a> {
    fn parse(base: BaseBlock, bytes: &mut BytesBuffer<'_>) -> anyhow::Result<Self> {
        let low_pack_size = bytes.pop_u32().context("reading packed size")?;
        let low_unp_size = bytes.pop_u32().context("reading unpacked size")?;
        let host_os: HostOs = bytes
            .pop_byte()
            .context("reading host OS")?
            .try_into()
            .context("parsing host OS")?;
        let file_crc = bytes.pop_u32().context("reading file CRC")?;
        let ftime = bytes.pop_u32().context("reading file time")?;
        let unp_ver = bytes.pop_byte().context("reading unpack version")?;
        let method = bytes.pop_byte().context("reading method")?;
        let name_size = bytes.pop_u16().context("reading name size")?;
        let attr = bytes.pop_u32().context("reading attributes")?;

        let (pack_size, unp_size) = if base.flags & file_flags::LARGE != 0 {
            let high_pack_size = bytes.pop_u32().context("reading high packed size")?;
            let high_unp_size = bytes.pop_u32().context("reading high unpacked size")?;
            (
                u64::from(high_pack_size) << 32 | u64::from(low_pack_size),
                u64::from(high_unp_size) << 32 | u64::from(low_unp_size),
            )
        } else {
            (u64::from(low_pack_size), u64::from(low_unp_size))
        };

        let name_bytes = bytes
            .pop_bytes(name_size as usize)
            .context("reading file name")?;
        // Unicode names append an encoded copy after a NUL.
        let name_bytes = match name_bytes.iter().position(|&b| b == 0) {
            Some(end) if base.flags & file_flags::UNICODE != 0 => &name_bytes[..end],
            _ => name_bytes,
        };
        let name = String::from_utf8_lossy(name_bytes).into_owned();

        let salt = if base.flags & file_flags::SALT != 0 {
            Some(
                bytes
                    .pop_bytes(8)
                    .context("reading salt")?
                    .try_into()
                    .context("converting salt")?,
            )
        } else {
            None
        };

        let times = if base.flags & file_flags::EXT_TIME != 0 {
            FileTimes::parse_extended(ftime, bytes).context("parsing extended time")?
        } else {
            FileTimes::from_dos(ftime)
        };

        Ok(Self {
            base,
            pack_size,
            unp_size,
            host_os,
            file_crc,
            times,
            unp_ver,
            method,
            attr,
            name,
            salt,
            data: &[],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> u16 {
        self.base.flags
    }

    pub fn pack_size(&self) -> u64 {
        self.pack_size
    }

    pub fn unp_size(&self) -> u64 {
        self.unp_size
    }

    pub fn unpack_version(&self) -> u8 {
        self.unp_ver
    }

    pub fn method(&self) -> u8 {
        self.method
    }

    pub fn times(&self) -> &FileTimes {
        &self.times
    }

    /// The packed payload of this entry.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_directory(&self) -> bool {
        self.flags() & file_flags::WINDOW_MASK == file_flags::DIRECTORY
    }

    /// Dictionary size in bytes, 0 for directories.
    pub fn window_size(&self) -> u32 {
        if self.is_directory() {
            0
        } else {
            0x10000 << ((self.flags() & file_flags::WINDOW_MASK) >> 5)
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags() & file_flags::PASSWORD != 0
    }

    pub fn is_split(&self) -> bool {
        self.flags() & (file_flags::SPLIT_BEFORE | file_flags::SPLIT_AFTER) != 0
    }

    pub fn is_solid(&self) -> bool {
        self.flags() & file_flags::SOLID != 0
    }

    pub fn is_stored(&self) -> bool {
        self.method == METHOD_STORE
    }
}

impl Display for FileHeader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "File {}", self.base)?;
        writeln!(
            f,
            "  Flags: {}",
            flag_names(self.flags(), &file_flags::NAMES)
        )?;
        writeln!(
            f,
            "  Packed: {:#010x} Unpacked: {:#010x} HostOS: {:?}",
            self.pack_size, self.unp_size, self.host_os
        )?;
        writeln!(f, "  CRC: {:#010x}", self.file_crc)?;
        if let Some(modified) = self.times.modified {
            writeln!(f, "  Time: {modified}")?;
        }
        for (label, time) in [
            ("Created", self.times.created),
            ("Accessed", self.times.accessed),
            ("Archived", self.times.archived),
        ] {
            if let Some(time) = time {
                writeln!(f, "  {label}: {time}")?;
            }
        }
        writeln!(f, "  Ver: {} Method: {:#04x}", self.unp_ver, self.method)?;
        writeln!(f, "  FileAttr: {:#010x}", self.attr)?;
        writeln!(f, "  WinSize: {:#010x}", self.window_size())?;
        if let Some(salt) = self.salt {
            writeln!(f, "  Salt: {:#018x}", u64::from_be_bytes(salt))?;
        }
        writeln!(f, "  Filename: {:?}", self.name)
    }
}

#[derive(Debug, Clone)]
pub enum Block<'a> {
    Main(MainHeader),
    File(FileHeader<'a>),
    EndArchive(BaseBlock),
    Other(BaseBlock),
}

impl Display for Block<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Block::Main(main) => write!(f, "{main}"),
            Block::File(file) => write!(f, "{file}"),
            Block::EndArchive(base) | Block::Other(base) => writeln!(f, "Block {base}"),
        }
    }
}

/// Iterator over the blocks of a RAR 1.5-4.x archive held in memory.
pub struct Archive<'a> {
    bytes: BytesBuffer<'a>,
    format: Format,
    done: bool,
}

impl<'a> TryFrom<&'a [u8]> for Archive<'a> {
    type Error = anyhow::Error;

    fn try_from(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        let format: Format = bytes.try_into().context("detecting archive format")?;
        ensure!(
            format == Format::Rar15,
            "unsupported archive format: {format:?}"
        );
        let mut bytes = BytesBuffer::new(bytes);
        bytes
            .pop_bytes(SIGNATURE_SIZE)
            .context("skipping signature")?;
        Ok(Self {
            bytes,
            format,
            done: false,
        })
    }
}

impl<'a> Archive<'a> {
    pub fn format(&self) -> Format {
        self.format
    }

    fn next_block(&mut self) -> anyhow::Result<Option<Block<'a>>> {
        if self.bytes.remaining() == 0 {
            debug!("archive ends without an end-of-archive block");
            return Ok(None);
        }
        let block_start = self.bytes.byte_cursor();
        let base: BaseBlock = self
            .bytes
            .pop_bytes(BASE_BLOCK_SIZE)
            .context("reading base block")?
            .try_into()
            .context(format!("parsing base block at byte {block_start}"))?;
        let mut header = BytesBuffer::new(
            self.bytes
                .pop_bytes(base.head_size as usize - BASE_BLOCK_SIZE)
                .context(format!("reading {:?} header body", base.header_type))?,
        );
        trace!(block_start, %base, "block");

        let block = match base.header_type {
            HeaderType::Main => Block::Main(
                MainHeader::parse(base, &mut header).context("parsing main header")?,
            ),
            HeaderType::File => {
                let mut file =
                    FileHeader::parse(base, &mut header).context("parsing file header")?;
                let pack_size: usize = file
                    .pack_size
                    .try_into()
                    .context("packed size does not fit in memory")?;
                file.data = self
                    .bytes
                    .pop_bytes(pack_size)
                    .context(format!("reading packed data of {}", file.name))?;
                debug!(name = file.name.as_str(), pack_size, "file entry");
                Block::File(file)
            }
            HeaderType::EndArchive => {
                self.done = true;
                Block::EndArchive(base)
            }
            _ => {
                if base.flags & LONG_BLOCK != 0 {
                    let add_size = header.pop_u32().context("reading block data size")?;
                    self.bytes
                        .pop_bytes(add_size as usize)
                        .context(format!("skipping {:?} block data", base.header_type))?;
                }
                Block::Other(base)
            }
        };
        Ok(Some(block))
    }
}

impl<'a> Iterator for Archive<'a> {
    type Item = anyhow::Result<Block<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_block() {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
