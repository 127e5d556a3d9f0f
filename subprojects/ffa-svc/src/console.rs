//! Debug console output through `FFA_CONSOLE_LOG`.
//!
//! The characters travel in the argument registers themselves: up to 24 bytes packed into six
//! 32-bit registers, or up to 128 bytes packed into sixteen 64-bit registers. [`ConsoleLogger`]
//! plugs the console into the [`log`] facade.

use core::fmt::Write as _;

use crate::{
    code::{CONSOLE_LOG_32, CONSOLE_LOG_64},
    raw::{self, Conduit, Regs},
    result::{Error, Result},
};

/// Maximum message length of [`console_log_32`].
pub const MAX_LEN_32: usize = 6 * size_of::<u32>();

/// Maximum message length of [`console_log_64`].
pub const MAX_LEN_64: usize = 16 * size_of::<u64>();

/// Writes up to [`MAX_LEN_32`] bytes using the 32-bit interface.
pub fn console_log_32<C: Conduit + ?Sized>(conduit: &C, message: &[u8]) -> Result<()> {
    if message.is_empty() || message.len() > MAX_LEN_32 {
        return Err(Error::InvalidParameter);
    }

    let mut regs = Regs::new(CONSOLE_LOG_32);
    regs[1] = message.len() as u64;
    for (i, chunk) in message.chunks(size_of::<u32>()).enumerate() {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        regs[2 + i] = u32::from_le_bytes(word) as u64;
    }

    raw::call_success(conduit, regs).map(drop)
}

/// Writes up to [`MAX_LEN_64`] bytes using the 64-bit interface.
pub fn console_log_64<C: Conduit + ?Sized>(conduit: &C, message: &[u8]) -> Result<()> {
    if message.is_empty() || message.len() > MAX_LEN_64 {
        return Err(Error::InvalidParameter);
    }

    let mut regs = Regs::new(CONSOLE_LOG_64);
    regs[1] = message.len() as u64;
    for (i, chunk) in message.chunks(size_of::<u64>()).enumerate() {
        let mut word = [0u8; 8];
        word[..chunk.len()].copy_from_slice(chunk);
        regs[2 + i] = u64::from_le_bytes(word);
    }

    raw::call_success(conduit, regs).map(drop)
}

/// Writes a message of any length, split into as many 64-bit console calls as needed.
pub fn console_write<C: Conduit + ?Sized>(conduit: &C, message: &[u8]) -> Result<()> {
    message
        .chunks(MAX_LEN_64)
        .try_for_each(|chunk| console_log_64(conduit, chunk))
}

/// A cursor over a fixed byte buffer. Output past the end is dropped.
struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

impl core::fmt::Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buf.len().saturating_sub(self.pos);
        let to_write = bytes.len().min(remaining);

        if to_write > 0 {
            self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
        }

        Ok(())
    }
}

/// Size of the buffer a single record is formatted into.
const RECORD_BUFFER_SIZE: usize = 256;

/// A [`log::Log`] implementation that prints records on the FF-A console.
///
/// Records are formatted as `[LEVEL target] message` and truncated to 256 bytes.
pub struct ConsoleLogger<C> {
    conduit: C,
    level: log::LevelFilter,
}

impl<C: Conduit> ConsoleLogger<C> {
    /// Creates a logger writing records up to `level` through `conduit`.
    pub const fn new(conduit: C, level: log::LevelFilter) -> Self {
        Self { conduit, level }
    }

    /// Formats and prints a single record.
    pub fn write_record(&self, record: &log::Record<'_>) -> Result<()> {
        let mut buf = [0u8; RECORD_BUFFER_SIZE];
        let mut cursor = Cursor::new(&mut buf);

        // The cursor never fails, it truncates.
        let _ = writeln!(
            cursor,
            "[{} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );

        console_write(&self.conduit, cursor.written())
    }
}

impl<C: Conduit + Send + Sync> log::Log for ConsoleLogger<C> {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            // Nowhere left to report a failing console.
            let _ = self.write_record(record);
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;
    use core::fmt::Write;

    use super::*;
    use crate::{
        code,
        raw::NUM_REGS,
        testing::{ScriptedConduit, success},
    };

    /// Reassembles the bytes carried by a 64-bit console request.
    fn payload_64(regs: &Regs) -> Vec<u8> {
        let len = regs[1] as usize;
        regs.0[2..NUM_REGS]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .take(len)
            .collect()
    }

    #[test]
    fn test_console_log_32_packing() {
        let conduit = ScriptedConduit::new([success(&[])]);

        assert_eq!(console_log_32(&conduit, b"hello"), Ok(()));

        let req = conduit.requests()[0];
        assert_eq!(req.function_id(), code::CONSOLE_LOG_32);
        assert_eq!(req[1], 5);
        assert_eq!(req[2], u32::from_le_bytes(*b"hell") as u64);
        assert_eq!(req[3], b'o' as u64);
        assert_eq!(req[4], 0);
    }

    #[test]
    fn test_console_log_length_limits() {
        let conduit = ScriptedConduit::default();

        assert_eq!(console_log_32(&conduit, b""), Err(Error::InvalidParameter));
        assert_eq!(
            console_log_32(&conduit, &[b'x'; MAX_LEN_32 + 1]),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            console_log_64(&conduit, &[b'x'; MAX_LEN_64 + 1]),
            Err(Error::InvalidParameter)
        );
        assert!(conduit.requests().is_empty());
    }

    #[test]
    fn test_console_log_64_fills_every_register() {
        let conduit = ScriptedConduit::new([success(&[])]);
        let message: Vec<u8> = (0..MAX_LEN_64 as u8).collect();

        assert_eq!(console_log_64(&conduit, &message), Ok(()));

        let req = conduit.requests()[0];
        assert_eq!(req.function_id(), code::CONSOLE_LOG_64);
        assert_eq!(payload_64(&req), message);
    }

    #[test]
    fn test_console_write_splits_long_messages() {
        let conduit = ScriptedConduit::new([success(&[]), success(&[])]);
        let message = [b'a'; MAX_LEN_64 + 10];

        assert_eq!(console_write(&conduit, &message), Ok(()));

        let reqs = conduit.requests();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0][1], MAX_LEN_64 as u64);
        assert_eq!(reqs[1][1], 10);
    }

    #[test]
    fn test_logger_formats_record() {
        let conduit = ScriptedConduit::new([success(&[])]);
        let logger = ConsoleLogger::new(&conduit, log::LevelFilter::Info);

        let result = logger.write_record(
            &log::Record::builder()
                .args(format_args!("ready {}", 1))
                .level(log::Level::Warn)
                .target("tpm")
                .build(),
        );

        assert_eq!(result, Ok(()));
        assert_eq!(payload_64(&conduit.requests()[0]), b"[WARN tpm] ready 1\n");
    }

    #[test]
    fn test_cursor_truncates() {
        let mut buf = [0u8; 4];
        let mut cursor = Cursor::new(&mut buf);

        let _ = write!(cursor, "abcdef");

        assert_eq!(cursor.written(), b"abcd");
    }
}
