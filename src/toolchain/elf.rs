//! Header-only inspection of native executables.
//!
//! Before a toolchain binary is ever spawned we look at its ELF header and,
//! if present, the interpreter it asks for. Only a positively identified
//! desktop glibc loader disqualifies a binary; missing metadata does not, since
//! static and minimal binaries routinely lack it.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Bytes read from the front of a candidate.
pub const PROBE_WINDOW: usize = 256;
/// Anything shorter cannot hold even a 64-bit ELF header.
pub const MIN_HEADER_LEN: usize = 64;

const PT_INTERP: u32 = 3;
const FOREIGN_LOADER: &str = "ld-linux";
const ANDROID_LINKER: &str = "/system/bin/linker";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Debug, Eq, PartialEq)]
pub enum ElfError {
    TooShort(usize),
    BadMagic,
    /// A header field pointed outside the bytes that were read.
    Truncated(&'static str),
}

impl std::fmt::Display for ElfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElfError::TooShort(len) => write!(f, "only {} header bytes", len),
            ElfError::BadMagic => write!(f, "not an ELF file"),
            ElfError::Truncated(field) => write!(f, "`{}` lies outside the header window", field),
        }
    }
}

impl std::error::Error for ElfError {}

/// The program-header entry that decided the verdict, if any.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Interpreter {
    /// `e_phoff`, `e_phentsize` or `e_phnum` was zero.
    NoProgramHeaders,
    /// Every readable entry was scanned without meeting `PT_INTERP`.
    NotFound,
    Path(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElfSummary {
    pub class: ElfClass,
    pub endian: Endian,
    pub machine: u16,
    pub interpreter: Interpreter,
}

impl ElfSummary {
    pub fn is_runnable(&self) -> bool {
        match &self.interpreter {
            Interpreter::NoProgramHeaders | Interpreter::NotFound => true,
            Interpreter::Path(path) => {
                if path.contains(FOREIGN_LOADER) {
                    return false;
                }
                path.trim().is_empty() || path.contains(ANDROID_LINKER)
            }
        }
    }
}

/// Reads the first [`PROBE_WINDOW`] bytes of `path`, or fewer if the file is shorter.
pub fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(PROBE_WINDOW);
    File::open(path)?
        .take(PROBE_WINDOW as u64)
        .read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Whether `path` looks like a binary Android's linker can start.
///
/// Unreadable or malformed files are never runnable.
pub fn is_runnable(path: &Path) -> bool {
    match read_header(path) {
        Ok(bytes) => inspect(&bytes).is_ok_and(|summary| summary.is_runnable()),
        Err(e) => {
            log::debug!("Cannot read {}: {}", path.display(), e);
            false
        }
    }
}

pub fn inspect(bytes: &[u8]) -> Result<ElfSummary, ElfError> {
    if bytes.len() < MIN_HEADER_LEN {
        return Err(ElfError::TooShort(bytes.len()));
    }
    if bytes[..4] != ELF_MAGIC {
        return Err(ElfError::BadMagic);
    }
    let class = if bytes[4] == 2 {
        ElfClass::Elf64
    } else {
        ElfClass::Elf32
    };
    let endian = if bytes[5] == 1 {
        Endian::Little
    } else {
        Endian::Big
    };
    match endian {
        Endian::Little => inspect_with::<LittleEndian>(bytes, class, endian),
        Endian::Big => inspect_with::<BigEndian>(bytes, class, endian),
    }
}

fn inspect_with<B: ByteOrder>(
    bytes: &[u8],
    class: ElfClass,
    endian: Endian,
) -> Result<ElfSummary, ElfError> {
    let fields = Fields::<B>::new(bytes, class);
    let machine = fields.u16_at(18).ok_or(ElfError::Truncated("e_machine"))?;
    let (phoff, phentsize, phnum) = match class {
        ElfClass::Elf64 => (fields.word_at(32), fields.u16_at(54), fields.u16_at(56)),
        ElfClass::Elf32 => (fields.word_at(28), fields.u16_at(42), fields.u16_at(44)),
    };
    let phoff = phoff.ok_or(ElfError::Truncated("e_phoff"))?;
    let phentsize = phentsize.ok_or(ElfError::Truncated("e_phentsize"))? as u64;
    let phnum = phnum.ok_or(ElfError::Truncated("e_phnum"))? as u64;

    let interpreter = if phoff == 0 || phentsize == 0 || phnum == 0 {
        Interpreter::NoProgramHeaders
    } else {
        find_interpreter(&fields, phoff, phentsize, phnum)?
    };

    Ok(ElfSummary {
        class,
        endian,
        machine,
        interpreter,
    })
}

fn find_interpreter<B: ByteOrder>(
    fields: &Fields<B>,
    phoff: u64,
    phentsize: u64,
    phnum: u64,
) -> Result<Interpreter, ElfError> {
    let len = fields.bytes.len() as u64;
    for index in 0..phnum {
        let Some(entry) = index
            .checked_mul(phentsize)
            .and_then(|delta| delta.checked_add(phoff))
        else {
            break;
        };
        if entry.saturating_add(phentsize) > len {
            continue;
        }
        let entry = entry as usize;
        let p_type = fields.u32_at(entry).ok_or(ElfError::Truncated("p_type"))?;
        if p_type != PT_INTERP {
            continue;
        }
        // A PT_INTERP entry cut short by the window is malformed.
        let (offset, size) = match fields.class {
            ElfClass::Elf64 => (fields.word_at(entry + 8), fields.word_at(entry + 32)),
            ElfClass::Elf32 => (fields.word_at(entry + 4), fields.word_at(entry + 16)),
        };
        let offset = offset.ok_or(ElfError::Truncated("p_offset"))?;
        let size = size.ok_or(ElfError::Truncated("p_filesz"))?;
        if size == 0 || offset.saturating_add(size) > len {
            continue;
        }
        let raw = &fields.bytes[offset as usize..(offset + size) as usize];
        let path = raw.split(|&b| b == 0).next().unwrap_or_default();
        return Ok(Interpreter::Path(String::from_utf8_lossy(path).into_owned()));
    }
    Ok(Interpreter::NotFound)
}

/// Bounds-checked field reads with the file's own width and byte order.
struct Fields<'a, B> {
    bytes: &'a [u8],
    class: ElfClass,
    order: std::marker::PhantomData<B>,
}

impl<'a, B: ByteOrder> Fields<'a, B> {
    fn new(bytes: &'a [u8], class: ElfClass) -> Self {
        Self {
            bytes,
            class,
            order: std::marker::PhantomData,
        }
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        self.bytes.get(offset..offset + 2).map(B::read_u16)
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        self.bytes.get(offset..offset + 4).map(B::read_u32)
    }

    /// An address-sized field: 8 bytes for ELF64, 4 for ELF32.
    fn word_at(&self, offset: usize) -> Option<u64> {
        match self.class {
            ElfClass::Elf64 => self.bytes.get(offset..offset + 8).map(B::read_u64),
            ElfClass::Elf32 => self.u32_at(offset).map(u64::from),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use byteorder::{BigEndian, ByteOrder, LittleEndian};

    pub const ANDROID_LINKER64: &str = "/system/bin/linker64";
    pub const GLIBC_LOADER64: &str = "/lib64/ld-linux-x86-64.so.2";

    /// Offset of the interpreter string inside [`elf64_le`] images.
    pub const INTERP_OFFSET: usize = 64 + 2 * 56;

    /// A little-endian aarch64 ELF64 image: one PT_LOAD entry followed by a
    /// PT_INTERP entry pointing at `interpreter`, all within the probe window.
    pub fn elf64_le(interpreter: &str) -> Vec<u8> {
        let mut bytes = vec![0u8; INTERP_OFFSET + 32];
        bytes[..4].copy_from_slice(&super::ELF_MAGIC);
        bytes[4] = 2;
        bytes[5] = 1;
        bytes[6] = 1;
        LittleEndian::write_u16(&mut bytes[16..], 3); // ET_DYN
        LittleEndian::write_u16(&mut bytes[18..], 183); // EM_AARCH64
        LittleEndian::write_u64(&mut bytes[32..], 64);
        LittleEndian::write_u16(&mut bytes[52..], 64);
        LittleEndian::write_u16(&mut bytes[54..], 56);
        LittleEndian::write_u16(&mut bytes[56..], 2);

        LittleEndian::write_u32(&mut bytes[64..], 1); // PT_LOAD

        let interp = 64 + 56;
        LittleEndian::write_u32(&mut bytes[interp..], 3);
        LittleEndian::write_u64(&mut bytes[interp + 8..], INTERP_OFFSET as u64);
        LittleEndian::write_u64(&mut bytes[interp + 32..], interpreter.len() as u64 + 1);
        bytes[INTERP_OFFSET..INTERP_OFFSET + interpreter.len()]
            .copy_from_slice(interpreter.as_bytes());
        bytes
    }

    /// A big-endian ELF32 image with a single PT_INTERP entry.
    pub fn elf32_be(interpreter: &str) -> Vec<u8> {
        let interp_offset = 52 + 32;
        let mut bytes = vec![0u8; 128];
        bytes[..4].copy_from_slice(&super::ELF_MAGIC);
        bytes[4] = 1;
        bytes[5] = 2;
        BigEndian::write_u16(&mut bytes[18..], 8); // EM_MIPS
        BigEndian::write_u32(&mut bytes[28..], 52);
        BigEndian::write_u16(&mut bytes[42..], 32);
        BigEndian::write_u16(&mut bytes[44..], 1);
        BigEndian::write_u32(&mut bytes[52..], 3);
        BigEndian::write_u32(&mut bytes[56..], interp_offset as u32);
        BigEndian::write_u32(&mut bytes[68..], interpreter.len() as u32 + 1);
        bytes[interp_offset..interp_offset + interpreter.len()]
            .copy_from_slice(interpreter.as_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use tempfile::tempdir;

    fn verdict(bytes: &[u8]) -> bool {
        inspect(bytes).is_ok_and(|summary| summary.is_runnable())
    }

    #[test]
    fn should_reject_short_or_foreign_headers() {
        assert_eq!(inspect(&[]), Err(ElfError::TooShort(0)));
        let header = elf64_le(ANDROID_LINKER64);
        assert!(!verdict(&header[..63]));

        let mut pe = header.clone();
        pe[..2].copy_from_slice(b"MZ");
        assert_eq!(inspect(&pe), Err(ElfError::BadMagic));
        assert!(!verdict(&[0u8; 256]));
    }

    #[test]
    fn should_accept_android_linker_and_reject_glibc_loader() {
        let android = elf64_le(ANDROID_LINKER64);
        let summary = inspect(&android).unwrap();
        assert_eq!(summary.class, ElfClass::Elf64);
        assert_eq!(summary.endian, Endian::Little);
        assert_eq!(summary.machine, 183);
        assert_eq!(
            summary.interpreter,
            Interpreter::Path(ANDROID_LINKER64.to_string())
        );
        assert!(summary.is_runnable());

        // Same image, only the interpreter string differs.
        let mut glibc = android.clone();
        let end = INTERP_OFFSET + GLIBC_LOADER64.len() + 1;
        LittleEndian::write_u64(&mut glibc[64 + 56 + 32..], GLIBC_LOADER64.len() as u64 + 1);
        glibc.resize(glibc.len().max(end), 0);
        glibc[INTERP_OFFSET..end - 1].copy_from_slice(GLIBC_LOADER64.as_bytes());
        glibc[end - 1] = 0;
        assert!(!verdict(&glibc));
    }

    #[test]
    fn should_reject_unknown_interpreter() {
        assert!(!verdict(&elf64_le("/lib/ld-musl-aarch64.so.1")));
        assert!(verdict(&elf64_le("/system/bin/linker")));
    }

    #[test]
    fn should_accept_empty_interpreter() {
        assert!(verdict(&elf64_le("")));
    }

    #[test]
    fn should_accept_binary_without_program_headers() {
        let mut bytes = elf64_le(GLIBC_LOADER64);
        LittleEndian::write_u16(&mut bytes[56..], 0);
        assert_eq!(
            inspect(&bytes).unwrap().interpreter,
            Interpreter::NoProgramHeaders
        );
        assert!(verdict(&bytes));
    }

    #[test]
    fn should_accept_binary_without_interpreter_segment() {
        let mut bytes = elf64_le(GLIBC_LOADER64);
        LittleEndian::write_u32(&mut bytes[64 + 56..], 6); // PT_PHDR
        assert_eq!(inspect(&bytes).unwrap().interpreter, Interpreter::NotFound);
        assert!(verdict(&bytes));
    }

    #[test]
    fn should_skip_interpreter_outside_window() {
        let mut bytes = elf64_le(GLIBC_LOADER64);
        LittleEndian::write_u64(&mut bytes[64 + 56 + 8..], 0x238);
        assert_eq!(inspect(&bytes).unwrap().interpreter, Interpreter::NotFound);
        assert!(verdict(&bytes));
    }

    #[test]
    fn should_skip_entries_past_the_window() {
        let mut bytes = elf64_le(GLIBC_LOADER64);
        // The table now starts where the interpreter entry used to be and runs off the end.
        LittleEndian::write_u64(&mut bytes[32..], 64 + 56);
        LittleEndian::write_u16(&mut bytes[56..], 40);
        assert!(!verdict(&bytes), "❌ first readable PT_INTERP must still decide");

        LittleEndian::write_u64(&mut bytes[32..], u64::MAX - 8);
        assert!(verdict(&bytes));
    }

    #[test]
    fn should_reject_interpreter_entry_cut_by_the_window() {
        let mut bytes = elf64_le(ANDROID_LINKER64);
        bytes.resize(PROBE_WINDOW, 0);
        LittleEndian::write_u64(&mut bytes[32..], 240);
        LittleEndian::write_u16(&mut bytes[54..], 8);
        LittleEndian::write_u16(&mut bytes[56..], 1);
        LittleEndian::write_u32(&mut bytes[240..], 3);

        assert_eq!(inspect(&bytes), Err(ElfError::Truncated("p_filesz")));
        assert!(!verdict(&bytes));

        LittleEndian::write_u16(&mut bytes[54..], 2);
        LittleEndian::write_u64(&mut bytes[32..], 254);
        assert_eq!(inspect(&bytes), Err(ElfError::Truncated("p_type")));
    }

    #[test]
    fn should_read_big_endian_elf32() {
        let summary = inspect(&elf32_be("/system/bin/linker")).unwrap();
        assert_eq!(summary.class, ElfClass::Elf32);
        assert_eq!(summary.endian, Endian::Big);
        assert_eq!(summary.machine, 8);
        assert!(summary.is_runnable());
        assert!(!verdict(&elf32_be("/lib/ld-linux.so.3")));
    }

    #[test]
    fn should_probe_files_on_disk() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("libaapt2.so");
        std::fs::write(&good, elf64_le(ANDROID_LINKER64)).unwrap();
        assert!(is_runnable(&good));

        let script = dir.path().join("aapt2.sh");
        std::fs::write(&script, "#!/bin/sh\necho aapt2\n").unwrap();
        assert!(!is_runnable(&script));
        assert!(!is_runnable(&dir.path().join("missing")));
    }
}
