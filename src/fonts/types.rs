use std::fmt;

/// Instant in time as seconds since 1904-01-01 midnight UTC, as used by `head.created`
/// and `head.modified`.
#[derive(Debug, Copy, Clone)]
pub(in crate::fonts) struct LongDateTime(pub i64);

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub fn from_bytes(b: [u8; 4]) -> Self {
        Tag(b)
    }

    pub fn as_str(&self) -> std::borrow::Cow<str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &b in &self.0 {
            f.write_str(if b' ' <= b && b <= b'~' { (b as char).to_string() } else { "?".to_string() }.as_str())?
        }
        Ok(())
    }
}

impl From<LongDateTime> for std::time::SystemTime {
    fn from(instant: LongDateTime) -> Self {
        use std::time::{Duration, UNIX_EPOCH};

        // `date --utc -d 1904-01-01 +%s`
        let truetype_epoch = UNIX_EPOCH - Duration::from_secs(2_082_844_800);

        let seconds_since_truetype_epoch = instant.0;
        if seconds_since_truetype_epoch >= 0 {
            truetype_epoch + Duration::from_secs(seconds_since_truetype_epoch as u64)
        } else {
            truetype_epoch - Duration::from_secs((-seconds_since_truetype_epoch) as u64)
        }
    }
}
