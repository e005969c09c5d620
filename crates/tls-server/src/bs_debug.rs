//! Byte-string debug formatting: printable ASCII stays readable,
//! everything else comes out as `\xnn`.

use std::fmt;

pub(crate) struct BsDebug<'a>(pub &'a [u8]);

impl fmt::Debug for BsDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "\"")?;
        for &b in self.0 {
            if (0x20..0x7f).contains(&b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        write!(f, "\"")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::BsDebug;

    #[test]
    fn formats_mixed_bytes() {
        let s = format!("{:?}", BsDebug(b"h2\x00\xff"));
        assert_eq!(s, "\"h2\\x00\\xff\"");
    }
}
