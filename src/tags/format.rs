use serde::{Deserialize, Serialize};

/// Audio container of a song's content file. The set is closed: tag codecs
/// dispatch on it with a plain `match`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongFormat {
    #[default]
    Unknown,
    Flac,
    Mp3,
    Ogg,
}

impl SongFormat {
    /// Sniffs the container from the first bytes of the content.
    pub fn from_magic_bytes(content: &[u8]) -> Self {
        match content {
            [b'f', b'L', b'a', b'C', ..] => SongFormat::Flac,
            [b'O', b'g', b'g', b'S', ..] => SongFormat::Ogg,
            [b'I', b'D', b'3', ..] => SongFormat::Mp3,
            // MPEG audio frame sync: 11 set bits
            [0xFF, second, ..] if second & 0xE0 == 0xE0 => SongFormat::Mp3,
            _ => SongFormat::Unknown,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SongFormat::Flac => ".flac",
            SongFormat::Mp3 => ".mp3",
            SongFormat::Ogg => ".ogg",
            SongFormat::Unknown => ".data",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            SongFormat::Flac => "audio/flac",
            SongFormat::Mp3 => "audio/mpeg",
            SongFormat::Ogg => "audio/ogg",
            SongFormat::Unknown => "application/octet-stream",
        }
    }

    pub fn from_db_value(value: i64) -> Self {
        match value {
            1 => SongFormat::Flac,
            2 => SongFormat::Mp3,
            3 => SongFormat::Ogg,
            _ => SongFormat::Unknown,
        }
    }

    pub fn to_db_value(&self) -> i64 {
        match self {
            SongFormat::Unknown => 0,
            SongFormat::Flac => 1,
            SongFormat::Mp3 => 2,
            SongFormat::Ogg => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BitDepth {
    #[default]
    Unknown,
    Sixteen,
    TwentyFour,
}

impl BitDepth {
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            16 => BitDepth::Sixteen,
            24 => BitDepth::TwentyFour,
            _ => BitDepth::Unknown,
        }
    }

    pub fn from_db_value(value: i64) -> Self {
        match value {
            16 => BitDepth::Sixteen,
            24 => BitDepth::TwentyFour,
            _ => BitDepth::Unknown,
        }
    }

    pub fn to_db_value(&self) -> i64 {
        match self {
            BitDepth::Unknown => 0,
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_known_containers() {
        assert_eq!(SongFormat::from_magic_bytes(b"fLaC\0\0\0\x22"), SongFormat::Flac);
        assert_eq!(SongFormat::from_magic_bytes(b"OggS\0\x02"), SongFormat::Ogg);
        assert_eq!(SongFormat::from_magic_bytes(b"ID3\x04\0"), SongFormat::Mp3);
        assert_eq!(SongFormat::from_magic_bytes(&[0xFF, 0xFB, 0x90, 0x00]), SongFormat::Mp3);
    }

    #[test]
    fn unrecognised_content_is_unknown() {
        assert_eq!(SongFormat::from_magic_bytes(b""), SongFormat::Unknown);
        assert_eq!(SongFormat::from_magic_bytes(b"RIFF....WAVE"), SongFormat::Unknown);
        assert_eq!(SongFormat::from_magic_bytes(&[0xFF, 0x00]), SongFormat::Unknown);
    }

    #[test]
    fn db_values_are_stable() {
        for format in [
            SongFormat::Unknown,
            SongFormat::Flac,
            SongFormat::Mp3,
            SongFormat::Ogg,
        ] {
            assert_eq!(SongFormat::from_db_value(format.to_db_value()), format);
        }
        assert_eq!(SongFormat::Flac.to_db_value(), 1);
        assert_eq!(BitDepth::TwentyFour.to_db_value(), 24);
        assert_eq!(BitDepth::from_bits(16), BitDepth::Sixteen);
        assert_eq!(BitDepth::from_bits(32), BitDepth::Unknown);
    }

    #[test]
    fn extensions_and_mime_types() {
        assert_eq!(SongFormat::Flac.extension(), ".flac");
        assert_eq!(SongFormat::Unknown.extension(), ".data");
        assert_eq!(SongFormat::Mp3.mime_type(), "audio/mpeg");
    }
}
