//! Legacy prefix decoding.

use crate::operand::{Segment, Width};

use super::Cursor;

/// Repeat prefix kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepPrefix {
    /// F3: `rep` / `repe`.
    Rep,
    /// F2: `repne`.
    Repne,
}

/// Effective prefix state for one instruction.
///
/// Repeated or conflicting prefixes follow hardware behaviour: the last
/// segment override and the last repeat prefix win.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Prefixes {
    pub lock: bool,
    pub rep: Option<RepPrefix>,
    pub segment: Option<Segment>,
    /// 0x66
    pub operand_size: bool,
    /// 0x67
    pub address_size: bool,
    /// The most recently consumed prefix byte.
    pub last: Option<u8>,
    pub count: usize,
}

impl Prefixes {
    /// True if `byte` is one of the eleven legacy prefix bytes.
    pub fn is_prefix(byte: u8) -> bool {
        matches!(
            byte,
            0xF0 | 0xF2 | 0xF3 | 0x66 | 0x67 | 0x26 | 0x2E | 0x36 | 0x3E | 0x64 | 0x65
        )
    }

    /// Consume prefix bytes until a non-prefix byte or the end of input.
    pub fn read(cursor: &mut Cursor<'_>) -> Prefixes {
        let mut prefixes = Prefixes::default();
        while let Some(byte) = cursor.peek() {
            if !prefixes.apply(byte) {
                break;
            }
            cursor.advance(1);
        }
        prefixes
    }

    /// Record `byte` if it is a prefix. Returns false for any other byte.
    fn apply(&mut self, byte: u8) -> bool {
        match byte {
            0xF0 => self.lock = true,
            0xF2 => self.rep = Some(RepPrefix::Repne),
            0xF3 => self.rep = Some(RepPrefix::Rep),
            0x66 => self.operand_size = true,
            0x67 => self.address_size = true,
            _ => match Segment::from_prefix(byte) {
                Some(segment) => self.segment = Some(segment),
                None => return false,
            },
        }
        self.last = Some(byte);
        self.count += 1;
        true
    }

    /// Width of a `v`-sized operand under the current prefixes.
    pub fn operand_width(&self) -> Width {
        if self.operand_size {
            Width::Word
        } else {
            Width::Dword
        }
    }
}
