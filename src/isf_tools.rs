// src/isf_tools.rs
// ISF decoding: header fields and curve samples of a single channel file

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IsfError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Cannot list directory {}: {source}", .path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decode {}: {reason}", .path.display())]
    DecodeFailure { path: PathBuf, reason: String },

    #[error("Shape mismatch: row {row} has {found} samples, expected {expected}")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Time domain of {} ({found:?}) differs from reference ({reference:?})", .path.display())]
    TimeDomainMismatch {
        path: PathBuf,
        reference: TimeDomain,
        found: TimeDomain,
    },

    #[error("No ISF files found for {}", .0.display())]
    NoFiles(PathBuf),
}

pub type Result<T> = std::result::Result<T, IsfError>;

/// Abbreviated header keywords and their long forms.
const KEY_ABBREVIATIONS: &[(&str, &str)] = &[
    ("BYT_N", "BYT_NR"),
    ("BIT_N", "BIT_NR"),
    ("ENC", "ENCDG"),
    ("BN_F", "BN_FMT"),
    ("BYT_O", "BYT_OR"),
    ("NR_P", "NR_PT"),
    ("PT_F", "PT_FMT"),
    ("XUN", "XUNIT"),
    ("XIN", "XINCR"),
    ("XZE", "XZERO"),
    ("PT_O", "PT_OFF"),
    ("YUN", "YUNIT"),
    ("YMU", "YMULT"),
    ("YOF", "YOFF"),
    ("YZE", "YZERO"),
    ("WFI", "WFID"),
];

/// Integer encoding of the curve samples (`BN_FMT`).
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryFormat {
    /// `RI`, signed integer
    #[default]
    Signed,
    /// `RP`, positive integer
    Unsigned,
    /// `FP`, IEEE single precision
    Float,
}

impl FromStr for BinaryFormat {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s.to_ascii_uppercase().as_str() {
            "RI" => Ok(BinaryFormat::Signed),
            "RP" => Ok(BinaryFormat::Unsigned),
            "FP" => Ok(BinaryFormat::Float),
            _ => Err(()),
        }
    }
}

/// Byte order of multi-byte samples (`BYT_OR`).
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Msb,
    Lsb,
}

impl FromStr for ByteOrder {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s.to_ascii_uppercase().as_str() {
            "MSB" => Ok(ByteOrder::Msb),
            "LSB" => Ok(ByteOrder::Lsb),
            _ => Err(()),
        }
    }
}

/// Sample spacing, start time and sample count shared by the channels of
/// one capture. Compared with exact equality.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeDomain {
    pub xincr: f64,
    pub xzero: f64,
    pub nr_pt: u64,
}

/// Representation of the ISF preamble as decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct IsfHeader {
    pub byt_nr: usize,
    pub bn_fmt: BinaryFormat,
    pub byt_or: ByteOrder,
    pub nr_pt: u64,
    pub xincr: f64,
    pub xzero: f64,
    pub pt_off: i64,
    pub ymult: f64,
    pub yoff: f64,
    pub yzero: f64,
    pub xunit: Option<String>,
    pub yunit: Option<String>,
    pub wfid: Option<String>,
    /// Every preamble entry keyed by its canonical long name.
    pub fields: BTreeMap<String, String>,
}

impl Default for IsfHeader {
    fn default() -> Self {
        IsfHeader {
            byt_nr: 1,
            bn_fmt: BinaryFormat::default(),
            byt_or: ByteOrder::default(),
            nr_pt: 0,
            xincr: 0.0,
            xzero: 0.0,
            pt_off: 0,
            ymult: 1.0,
            yoff: 0.0,
            yzero: 0.0,
            xunit: None,
            yunit: None,
            wfid: None,
            fields: BTreeMap::new(),
        }
    }
}

impl IsfHeader {
    /// Parse the header from the ASCII preamble preceding the curve block
    fn parse_header(text: &str) -> std::result::Result<Self, String> {
        let fields = Self::parse_fields(text);

        let encoding = fields.get("ENCDG").map(String::as_str).unwrap_or("BIN");
        if !encoding.eq_ignore_ascii_case("BIN") {
            return Err(format!("unsupported encoding {encoding:?}"));
        }

        Ok(IsfHeader {
            byt_nr: Self::required(&fields, "BYT_NR")?,
            bn_fmt: Self::optional(&fields, "BN_FMT", BinaryFormat::Signed)?,
            byt_or: Self::optional(&fields, "BYT_OR", ByteOrder::Msb)?,
            nr_pt: Self::required(&fields, "NR_PT")?,
            xincr: Self::required(&fields, "XINCR")?,
            xzero: Self::required(&fields, "XZERO")?,
            pt_off: Self::optional(&fields, "PT_OFF", 0)?,
            ymult: Self::optional(&fields, "YMULT", 1.0)?,
            yoff: Self::optional(&fields, "YOFF", 0.0)?,
            yzero: Self::optional(&fields, "YZERO", 0.0)?,
            xunit: fields.get("XUNIT").cloned(),
            yunit: fields.get("YUNIT").cloned(),
            wfid: fields.get("WFID").cloned(),
            fields,
        })
    }

    /// The time domain this channel was sampled on.
    pub fn time_domain(&self) -> TimeDomain {
        TimeDomain {
            xincr: self.xincr,
            xzero: self.xzero,
            nr_pt: self.nr_pt,
        }
    }

    fn parse_fields(text: &str) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        for entry in Self::split_entries(text) {
            let (key, value) = entry
                .split_once(char::is_whitespace)
                .unwrap_or((entry, ""));
            let value = value.trim().trim_matches('"');
            fields.insert(Self::canonical_key(key), value.to_string());
        }
        fields
    }

    // `;` inside double quotes does not end an entry
    fn split_entries(text: &str) -> Vec<&str> {
        let mut entries = Vec::new();
        let mut start = 0;
        let mut quoted = false;

        for (idx, ch) in text.char_indices() {
            match ch {
                '"' => quoted = !quoted,
                ';' if !quoted => {
                    entries.push(&text[start..idx]);
                    start = idx + 1;
                }
                _ => {}
            }
        }
        entries.push(&text[start..]);

        entries
            .into_iter()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect()
    }

    fn canonical_key(raw: &str) -> String {
        let key = raw.rsplit(':').next().unwrap_or(raw).to_ascii_uppercase();
        KEY_ABBREVIATIONS
            .iter()
            .find(|(short, _)| *short == key)
            .map(|(_, long)| long.to_string())
            .unwrap_or(key)
    }

    fn required<T: FromStr>(
        fields: &BTreeMap<String, String>,
        key: &str,
    ) -> std::result::Result<T, String> {
        let value = fields
            .get(key)
            .ok_or_else(|| format!("missing header field {key}"))?;
        value
            .parse()
            .map_err(|_| format!("invalid value for {key}: {value:?}"))
    }

    fn optional<T: FromStr>(
        fields: &BTreeMap<String, String>,
        key: &str,
        default: T,
    ) -> std::result::Result<T, String> {
        match fields.get(key) {
            Some(_) => Self::required(fields, key),
            None => Ok(default),
        }
    }
}

/// The decoded content of one channel file.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedRecord {
    pub path: PathBuf,
    pub header: IsfHeader,
    /// Scaled samples, `(raw - YOFF) * YMULT + YZERO`.
    pub data: Vec<f64>,
}

impl ParsedRecord {
    pub fn new<P: Into<PathBuf>>(path: P, header: IsfHeader, data: Vec<f64>) -> Self {
        ParsedRecord {
            path: path.into(),
            header,
            data,
        }
    }

    /// Decode a record from the complete contents of an ISF file.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let (header, data) = Self::decode_bytes(bytes).map_err(|reason| IsfError::DecodeFailure {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(ParsedRecord::new(path, header, data))
    }

    pub fn time_domain(&self) -> TimeDomain {
        self.header.time_domain()
    }

    fn decode_bytes(bytes: &[u8]) -> std::result::Result<(IsfHeader, Vec<f64>), String> {
        let curve_start = bytes
            .windows(5)
            .position(|w| w == b":CURV")
            .ok_or("no curve block found")?;
        let hash = bytes[curve_start..]
            .iter()
            .position(|&b| b == b'#')
            .ok_or("curve block has no data marker")?;

        let header = IsfHeader::parse_header(&String::from_utf8_lossy(&bytes[..curve_start]))?;
        let curve = Self::curve_block(&bytes[curve_start + hash + 1..])?;
        let data = Self::decode_samples(&header, curve)?;

        Ok((header, data))
    }

    /// Extract the payload of a `#<n><len><bytes>` block (`#0<bytes>` when
    /// the length is indefinite).
    fn curve_block(block: &[u8]) -> std::result::Result<&[u8], String> {
        let (&digit, rest) = block.split_first().ok_or("truncated curve block")?;
        let width = (digit as char)
            .to_digit(10)
            .ok_or_else(|| format!("invalid block length digit {:?}", digit as char))?
            as usize;

        if width == 0 {
            return Ok(rest.strip_suffix(b"\n").unwrap_or(rest));
        }

        let len = rest
            .get(..width)
            .and_then(|digits| std::str::from_utf8(digits).ok())
            .and_then(|digits| digits.parse::<usize>().ok())
            .ok_or("invalid curve block length")?;
        let payload = &rest[width..];

        payload.get(..len).ok_or_else(|| {
            format!(
                "curve block declares {} bytes but only {} are present",
                len,
                payload.len()
            )
        })
    }

    fn decode_samples(header: &IsfHeader, curve: &[u8]) -> std::result::Result<Vec<f64>, String> {
        let sample: fn(&[u8]) -> f64 = match (header.byt_nr, header.bn_fmt, header.byt_or) {
            (1, BinaryFormat::Signed, _) => |b| f64::from(b[0] as i8),
            (1, BinaryFormat::Unsigned, _) => |b| f64::from(b[0]),
            (2, BinaryFormat::Signed, ByteOrder::Msb) => |b| f64::from(i16::from_be_bytes([b[0], b[1]])),
            (2, BinaryFormat::Signed, ByteOrder::Lsb) => |b| f64::from(i16::from_le_bytes([b[0], b[1]])),
            (2, BinaryFormat::Unsigned, ByteOrder::Msb) => |b| f64::from(u16::from_be_bytes([b[0], b[1]])),
            (2, BinaryFormat::Unsigned, ByteOrder::Lsb) => |b| f64::from(u16::from_le_bytes([b[0], b[1]])),
            (4, BinaryFormat::Signed, ByteOrder::Msb) => |b| f64::from(i32::from_be_bytes([b[0], b[1], b[2], b[3]])),
            (4, BinaryFormat::Signed, ByteOrder::Lsb) => |b| f64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            (4, BinaryFormat::Unsigned, ByteOrder::Msb) => |b| f64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
            (4, BinaryFormat::Unsigned, ByteOrder::Lsb) => |b| f64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            (4, BinaryFormat::Float, ByteOrder::Msb) => |b| f64::from(f32::from_be_bytes([b[0], b[1], b[2], b[3]])),
            (4, BinaryFormat::Float, ByteOrder::Lsb) => |b| f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            (width, format, _) => {
                return Err(format!("unsupported sample layout: {width} bytes, {format:?}"));
            }
        };

        if curve.len() % header.byt_nr != 0 {
            return Err(format!(
                "curve length {} is not a multiple of BYT_NR {}",
                curve.len(),
                header.byt_nr
            ));
        }

        Ok(curve
            .chunks_exact(header.byt_nr)
            .map(|b| (sample(b) - header.yoff) * header.ymult + header.yzero)
            .collect())
    }
}

/// Source of one [`ParsedRecord`] per channel file.
pub trait Decoder {
    fn decode(&self, path: &Path) -> Result<ParsedRecord>;
}

impl<F> Decoder for F
where
    F: Fn(&Path) -> Result<ParsedRecord>,
{
    fn decode(&self, path: &Path) -> Result<ParsedRecord> {
        self(path)
    }
}

/// Decoder for Tektronix `.isf` files.
#[derive(Default, Clone, Copy, Debug)]
pub struct IsfDecoder;

impl Decoder for IsfDecoder {
    fn decode(&self, path: &Path) -> Result<ParsedRecord> {
        let bytes = fs::read(path)?;
        let record = ParsedRecord::from_bytes(path, &bytes)?;

        debug!(
            "decoded {}: {} samples, XINCR={}, XZERO={}, NR_PT={}",
            path.display(),
            record.data.len(),
            record.header.xincr,
            record.header.xzero,
            record.header.nr_pt
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn isf_bytes(preamble: &str, curve: &[u8]) -> Vec<u8> {
        let len = curve.len().to_string();
        let mut bytes = format!("{preamble};:CURVE #{}{}", len.len(), len).into_bytes();
        bytes.extend_from_slice(curve);
        bytes.push(b'\n');
        bytes
    }

    const PREAMBLE: &str = ":WFMPRE:BYT_NR 2;BIT_NR 16;ENCDG BIN;BN_FMT RI;BYT_OR MSB;\
        WFID \"Ch1, DC coupling; 2.0E0 V/div\";NR_PT 3;PT_FMT Y;XUNIT \"s\";\
        XINCR 4.0E-9;XZERO -2.0E-6;PT_OFF 0;YUNIT \"V\";YMULT 5.0E-1;YOFF 2.0E0;YZERO 1.0E0";

    fn msb_curve(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn test_header_parsing() {
        let header = IsfHeader::parse_header(PREAMBLE).unwrap();

        assert_eq!(header.byt_nr, 2);
        assert_eq!(header.bn_fmt, BinaryFormat::Signed);
        assert_eq!(header.byt_or, ByteOrder::Msb);
        assert_eq!(header.nr_pt, 3);
        assert_eq!(header.xincr, 4.0e-9);
        assert_eq!(header.xzero, -2.0e-6);
        assert_eq!(header.ymult, 0.5);
        assert_eq!(header.xunit.as_deref(), Some("s"));
        assert_eq!(header.wfid.as_deref(), Some("Ch1, DC coupling; 2.0E0 V/div"));
        assert_eq!(header.fields.get("PT_FMT").map(String::as_str), Some("Y"));
    }

    #[test]
    fn test_abbreviated_keys() {
        let text = ":WFMP:BYT_N 1;BN_F RP;BYT_O LSB;NR_P 10;XIN 1.0E-3;XZE 5.0E-1;YMU 2.0E0";
        let header = IsfHeader::parse_header(text).unwrap();

        assert_eq!(header.byt_nr, 1);
        assert_eq!(header.bn_fmt, BinaryFormat::Unsigned);
        assert_eq!(header.byt_or, ByteOrder::Lsb);
        assert_eq!(
            header.time_domain(),
            TimeDomain { xincr: 1.0e-3, xzero: 0.5, nr_pt: 10 }
        );
        assert_eq!(header.ymult, 2.0);
        assert_eq!(header.yoff, 0.0);
    }

    #[test]
    fn test_missing_required_field() {
        let result = IsfHeader::parse_header("BYT_NR 1;NR_PT 4;XZERO 0");
        assert_eq!(result.unwrap_err(), "missing header field XINCR");
    }

    #[test]
    fn test_ascii_encoding_rejected() {
        let result = IsfHeader::parse_header("ENCDG ASC;BYT_NR 1;NR_PT 1;XINCR 1;XZERO 0");
        assert!(result.is_err());
    }

    #[test]
    fn test_scaled_samples() {
        let bytes = isf_bytes(PREAMBLE, &msb_curve(&[-2, 0, 4]));
        let record = ParsedRecord::from_bytes(Path::new("ch1.isf"), &bytes).unwrap();

        assert_eq!(record.data, vec![-1.0, 0.0, 2.0]);
        assert_eq!(record.path, PathBuf::from("ch1.isf"));
    }

    #[test]
    fn test_lsb_unsigned_samples() {
        let preamble = "BYT_NR 2;BN_FMT RP;BYT_OR LSB;NR_PT 2;XINCR 1;XZERO 0";
        let curve: Vec<u8> = [1u16, 65535].iter().flat_map(|v| v.to_le_bytes()).collect();
        let record = ParsedRecord::from_bytes(Path::new("x.isf"), &isf_bytes(preamble, &curve)).unwrap();

        assert_eq!(record.data, vec![1.0, 65535.0]);
    }

    #[test]
    fn test_indefinite_block() {
        let mut bytes = b"BYT_NR 1;NR_PT 3;XINCR 1;XZERO 0;:CURVE #0".to_vec();
        bytes.extend_from_slice(&[1, 2, 0xff]);
        bytes.push(b'\n');
        let record = ParsedRecord::from_bytes(Path::new("x.isf"), &bytes).unwrap();

        assert_eq!(record.data, vec![1.0, 2.0, -1.0]);
    }

    #[test]
    fn test_truncated_curve() {
        let mut bytes = isf_bytes(PREAMBLE, &msb_curve(&[1, 2, 3]));
        bytes.truncate(bytes.len() - 4);
        let result = ParsedRecord::from_bytes(Path::new("ch1.isf"), &bytes);

        assert!(matches!(result, Err(IsfError::DecodeFailure { .. })));
    }

    #[test]
    fn test_no_curve_block() {
        let result = ParsedRecord::from_bytes(Path::new("ch1.isf"), PREAMBLE.as_bytes());
        match result {
            Err(IsfError::DecodeFailure { path, reason }) => {
                assert_eq!(path, PathBuf::from("ch1.isf"));
                assert_eq!(reason, "no curve block found");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_sample_width() {
        let bytes = isf_bytes("BYT_NR 3;NR_PT 1;XINCR 1;XZERO 0", &[0, 0, 1]);
        let result = ParsedRecord::from_bytes(Path::new("x.isf"), &bytes);
        assert!(matches!(result, Err(IsfError::DecodeFailure { .. })));
    }

    #[test]
    fn test_file_loading() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(&isf_bytes(PREAMBLE, &msb_curve(&[10, 20, 30])))
            .unwrap();
        temp_file.flush().unwrap();

        let record = IsfDecoder.decode(temp_file.path()).unwrap();
        assert_eq!(record.header.nr_pt, 3);
        assert_eq!(record.data, vec![5.0, 10.0, 15.0]);
    }

    #[test]
    fn test_missing_file() {
        let result = IsfDecoder.decode(Path::new("non_existent.isf"));
        assert!(matches!(result, Err(IsfError::Io(_))));
    }

    #[test]
    fn test_closure_decoder() {
        let decoder = |path: &Path| -> Result<ParsedRecord> {
            Ok(ParsedRecord::new(path, IsfHeader::default(), vec![1.0]))
        };
        let record = decoder.decode(Path::new("fake.isf")).unwrap();
        assert_eq!(record.data, vec![1.0]);
    }
}
