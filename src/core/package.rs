//! Self-describing package format understood by the host loader
//!
//! Every entry written to the device is a package: a fixed 128-byte header,
//! one to three 32x32 icon frames, an optional eye-catch image, and an opaque
//! payload. The host BIOS reads the header to display the entry, so the layout
//! is fixed by the device and cannot carry long names itself.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ 0x00  desc_short[16]      (space padded)     │
//! │ 0x10  desc_long[32]       (space padded)     │
//! │ 0x30  app_id[16]          (NUL padded)       │
//! │ 0x40  icon_count: u16                        │
//! │ 0x42  icon_anim_speed: u16                   │
//! │ 0x44  eyecatch_type: u16                     │
//! │ 0x46  crc: u16                               │
//! │ 0x48  data_len: u32                          │
//! │ 0x4C  reserved[20]                           │
//! │ 0x60  icon_palette[16]: u16                  │
//! ├──────────────────────────────────────────────┤
//! │ icon frames (512 bytes each)                 │
//! │ eye-catch image (size depends on its type)   │
//! │ payload (data_len bytes)                     │
//! └──────────────────────────────────────────────┘
//! ```

use crate::core::config::SaveConfig;
use crate::core::error::{Result, SaveError};
use crate::core::icon;

/// Size of the fixed package header in bytes
pub const HEADER_SIZE: usize = 128;

/// Size of one 32x32, 4 bits-per-pixel icon frame
pub const ICON_SIZE: usize = 512;

/// The host loader animates at most three icon frames
pub const MAX_ICONS: u16 = 3;

/// Number of ARGB4444 palette entries shared by all icon frames
pub const PALETTE_LEN: usize = 16;

const DESC_SHORT_LEN: usize = 16;
const DESC_LONG_LEN: usize = 32;
const APP_ID_LEN: usize = 16;
const CRC_OFFSET: usize = 0x46;

/// Eye-catch image encoding
///
/// The eye-catch is a 72x56 picture shown by the file manager. Its byte
/// length is fully determined by the encoding.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyecatchType {
    /// No eye-catch image
    None = 0,
    /// 16-bit ARGB4444 pixels
    Rgb4444 = 1,
    /// 256-colour palette followed by 8-bit indices
    Palette256 = 2,
    /// 16-colour palette followed by 4-bit indices
    Palette16 = 3,
}

impl EyecatchType {
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(EyecatchType::None),
            1 => Ok(EyecatchType::Rgb4444),
            2 => Ok(EyecatchType::Palette256),
            3 => Ok(EyecatchType::Palette16),
            _ => Err(SaveError::Decode(format!(
                "unknown eye-catch type {}",
                value
            ))),
        }
    }

    /// Encoded size of the eye-catch block in bytes
    pub const fn size(self) -> usize {
        match self {
            EyecatchType::None => 0,
            EyecatchType::Rgb4444 => 72 * 56 * 2,
            EyecatchType::Palette256 => 512 + 72 * 56,
            EyecatchType::Palette16 => 32 + 72 * 56 / 2,
        }
    }
}

/// Total size of header plus icon and eye-catch media
pub const fn media_size(icon_count: u16, eyecatch: EyecatchType) -> usize {
    HEADER_SIZE + icon_count as usize * ICON_SIZE + eyecatch.size()
}

/// Caller-controlled header fields
///
/// The CRC and payload length are derived while building and are not part
/// of this struct, so a parsed header compares equal to the one it was
/// built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHeader {
    pub desc_short: [u8; DESC_SHORT_LEN],
    pub desc_long: [u8; DESC_LONG_LEN],
    pub app_id: [u8; APP_ID_LEN],
    pub icon_count: u16,
    pub icon_anim_speed: u16,
    pub eyecatch_type: EyecatchType,
    pub icon_palette: [u16; PALETTE_LEN],
}

impl PackageHeader {
    /// Create a header with padded text fields and a single icon frame
    pub fn new(short: &str, long: &str, app_id: &str) -> Self {
        PackageHeader {
            desc_short: padded_text(short, b' '),
            desc_long: padded_text(long, b' '),
            app_id: padded_text(app_id, 0),
            icon_count: 1,
            icon_anim_speed: 0,
            eyecatch_type: EyecatchType::None,
            icon_palette: [0; PALETTE_LEN],
        }
    }

    pub fn short_description(&self) -> String {
        trimmed_text(&self.desc_short)
    }

    pub fn long_description(&self) -> String {
        trimmed_text(&self.desc_long)
    }

    pub fn app_id(&self) -> String {
        trimmed_text(&self.app_id)
    }

    /// Bytes occupied before the payload
    pub fn overhead(&self) -> usize {
        media_size(self.icon_count, self.eyecatch_type)
    }

    fn check_icon_count(&self) -> Result<()> {
        if self.icon_count == 0 || self.icon_count > MAX_ICONS {
            return Err(SaveError::InvalidPackage(format!(
                "icon count must be 1..={}, got {}",
                MAX_ICONS, self.icon_count
            )));
        }
        Ok(())
    }
}

/// A parsed package borrowing from the buffer it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package<'a> {
    pub header: PackageHeader,
    pub icons: &'a [u8],
    pub eyecatch: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> Package<'a> {
    /// Offset of the payload from the start of the package
    pub fn payload_offset(&self) -> usize {
        self.header.overhead()
    }

    /// Exact encoded length, excluding any block padding
    pub fn encoded_len(&self) -> usize {
        self.header.overhead() + self.payload.len()
    }
}

/// Serialize a package
///
/// `max_size` is the largest entry the target device can hold. The returned
/// buffer is exactly header + media + payload long.
pub fn build(
    header: &PackageHeader,
    icons: &[u8],
    eyecatch: &[u8],
    payload: &[u8],
    max_size: usize,
) -> Result<Vec<u8>> {
    header.check_icon_count()?;

    let icon_bytes = header.icon_count as usize * ICON_SIZE;
    if icons.len() != icon_bytes {
        return Err(SaveError::InvalidPackage(format!(
            "expected {} icon bytes for {} frame(s), got {}",
            icon_bytes,
            header.icon_count,
            icons.len()
        )));
    }
    if eyecatch.len() != header.eyecatch_type.size() {
        return Err(SaveError::InvalidPackage(format!(
            "expected {} eye-catch bytes for {:?}, got {}",
            header.eyecatch_type.size(),
            header.eyecatch_type,
            eyecatch.len()
        )));
    }

    let total = header.overhead() + payload.len();
    if total > max_size {
        return Err(SaveError::PackageTooLarge {
            size: total,
            max: max_size,
        });
    }
    let data_len = u32::try_from(payload.len()).map_err(|_| SaveError::PackageTooLarge {
        size: total,
        max: u32::MAX as usize,
    })?;

    let mut bytes = Vec::with_capacity(total);
    bytes.extend_from_slice(&header.desc_short);
    bytes.extend_from_slice(&header.desc_long);
    bytes.extend_from_slice(&header.app_id);
    bytes.extend_from_slice(&header.icon_count.to_le_bytes());
    bytes.extend_from_slice(&header.icon_anim_speed.to_le_bytes());
    bytes.extend_from_slice(&(header.eyecatch_type as u16).to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes()); // crc, patched below
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 20]);
    for entry in &header.icon_palette {
        bytes.extend_from_slice(&entry.to_le_bytes());
    }
    debug_assert_eq!(bytes.len(), HEADER_SIZE);

    bytes.extend_from_slice(icons);
    bytes.extend_from_slice(eyecatch);
    bytes.extend_from_slice(payload);

    let crc = crc16(&bytes);
    bytes[CRC_OFFSET..CRC_OFFSET + 2].copy_from_slice(&crc.to_le_bytes());

    Ok(bytes)
}

/// Parse a package without copying its media or payload
///
/// Bytes past the declared payload (block padding added by the device) are
/// ignored.
pub fn parse(bytes: &[u8]) -> Result<Package<'_>> {
    if bytes.len() < HEADER_SIZE {
        return Err(SaveError::Decode(format!(
            "package is {} bytes, shorter than the {}-byte header",
            bytes.len(),
            HEADER_SIZE
        )));
    }

    let mut header = PackageHeader::new("", "", "");
    header.desc_short.copy_from_slice(&bytes[0x00..0x10]);
    header.desc_long.copy_from_slice(&bytes[0x10..0x30]);
    header.app_id.copy_from_slice(&bytes[0x30..0x40]);
    header.icon_count = read_u16(bytes, 0x40);
    header.icon_anim_speed = read_u16(bytes, 0x42);
    header.eyecatch_type = EyecatchType::from_u16(read_u16(bytes, 0x44))?;
    let stored_crc = read_u16(bytes, CRC_OFFSET);
    let data_len = read_u32(bytes, 0x48) as usize;
    for (i, entry) in header.icon_palette.iter_mut().enumerate() {
        *entry = read_u16(bytes, 0x60 + i * 2);
    }

    if header.icon_count == 0 || header.icon_count > MAX_ICONS {
        return Err(SaveError::Decode(format!(
            "icon count {} out of range",
            header.icon_count
        )));
    }

    let icons_end = HEADER_SIZE + header.icon_count as usize * ICON_SIZE;
    let media_end = header.overhead();
    let end = media_end
        .checked_add(data_len)
        .ok_or_else(|| SaveError::Decode("payload length overflows".to_string()))?;
    if bytes.len() < end {
        return Err(SaveError::Decode(format!(
            "package truncated: header declares {} bytes, buffer holds {}",
            end,
            bytes.len()
        )));
    }

    let computed = crc16_skipping_field(&bytes[..end]);
    if computed != stored_crc {
        return Err(SaveError::Decode(format!(
            "package checksum mismatch: stored {:#06x}, computed {:#06x}",
            stored_crc, computed
        )));
    }

    Ok(Package {
        header,
        icons: &bytes[HEADER_SIZE..icons_end],
        eyecatch: &bytes[icons_end..media_end],
        payload: &bytes[media_end..end],
    })
}

/// Fixed header fields and media stamped onto every save package
#[derive(Debug, Clone)]
pub struct PackageTemplate {
    pub header: PackageHeader,
    pub icons: Vec<u8>,
    pub eyecatch: Vec<u8>,
}

impl PackageTemplate {
    /// Template using the built-in icon and no eye-catch
    pub fn new(short: &str, app_id: &str) -> Self {
        let mut header = PackageHeader::new(short, "", app_id);
        header.icon_palette = icon::DEFAULT_PALETTE;
        PackageTemplate {
            header,
            icons: icon::default_icon().to_vec(),
            eyecatch: Vec::new(),
        }
    }

    pub fn from_config(config: &SaveConfig) -> Self {
        Self::new(&config.short_description, &config.app_id)
    }

    /// Bytes of every package spent on header and media
    pub fn overhead(&self) -> usize {
        self.header.overhead()
    }

    /// Build a package whose long description shows `label`
    pub fn build(&self, label: &str, payload: &[u8], max_size: usize) -> Result<Vec<u8>> {
        let mut header = self.header.clone();
        header.desc_long = padded_text(label, b' ');
        build(&header, &self.icons, &self.eyecatch, payload, max_size)
    }
}

/// CRC-16/XMODEM (polynomial 0x1021, initial value 0)
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| crc16_step(crc, byte))
}

fn crc16_step(mut crc: u16, byte: u8) -> u16 {
    crc ^= (byte as u16) << 8;
    for _ in 0..8 {
        crc = if crc & 0x8000 != 0 {
            (crc << 1) ^ 0x1021
        } else {
            crc << 1
        };
    }
    crc
}

/// CRC over a package with its stored crc field treated as zero
fn crc16_skipping_field(bytes: &[u8]) -> u16 {
    let crc = crc16(&bytes[..CRC_OFFSET]);
    let crc = crc16_step(crc16_step(crc, 0), 0);
    bytes[CRC_OFFSET + 2..]
        .iter()
        .fold(crc, |crc, &byte| crc16_step(crc, byte))
}

/// Pad `text` into a fixed field, replacing non-ASCII bytes with `?`
fn padded_text<const N: usize>(text: &str, pad: u8) -> [u8; N] {
    let mut field = [pad; N];
    for (slot, byte) in field.iter_mut().zip(text.bytes()) {
        *slot = if byte.is_ascii() && byte != 0 { byte } else { b'?' };
    }
    field
}

fn trimmed_text(field: &[u8]) -> String {
    let end = field
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |i| i + 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 200 * 512;

    fn sample_header() -> PackageHeader {
        let mut header = PackageHeader::new("Saved Game", "slot one", "vmu-saves");
        header.icon_palette = icon::DEFAULT_PALETTE;
        header
    }

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_eyecatch_sizes() {
        assert_eq!(EyecatchType::None.size(), 0);
        assert_eq!(EyecatchType::Rgb4444.size(), 8064);
        assert_eq!(EyecatchType::Palette256.size(), 4544);
        assert_eq!(EyecatchType::Palette16.size(), 2048);
        assert!(EyecatchType::from_u16(4).is_err());
    }

    #[test]
    fn test_build_exact_length() {
        let header = sample_header();
        let bytes = build(&header, &[0u8; ICON_SIZE], &[], b"payload", MAX).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + ICON_SIZE + 7);
    }

    #[test]
    fn test_parse_returns_same_header_and_payload() {
        let header = sample_header();
        let icon = [0x12u8; ICON_SIZE];
        let bytes = build(&header, &icon, &[], b"hello world", MAX).unwrap();

        let package = parse(&bytes).unwrap();
        assert_eq!(package.header, header);
        assert_eq!(package.payload, b"hello world");
        assert_eq!(package.icons, &icon[..]);
        assert_eq!(package.header.short_description(), "Saved Game");
        assert_eq!(package.header.long_description(), "slot one");
        assert_eq!(package.header.app_id(), "vmu-saves");
    }

    #[test]
    fn test_parse_with_eyecatch() {
        let mut header = sample_header();
        header.icon_count = 2;
        header.icon_anim_speed = 10;
        header.eyecatch_type = EyecatchType::Palette16;
        let icons = vec![0xAB; 2 * ICON_SIZE];
        let eyecatch = vec![0x5A; EyecatchType::Palette16.size()];

        let bytes = build(&header, &icons, &eyecatch, b"data", MAX).unwrap();
        let package = parse(&bytes).unwrap();
        assert_eq!(package.header, header);
        assert_eq!(package.eyecatch, &eyecatch[..]);
        assert_eq!(package.payload_offset(), HEADER_SIZE + 2 * ICON_SIZE + 2048);
    }

    #[test]
    fn test_parse_ignores_block_padding() {
        let bytes = build(&sample_header(), &[0u8; ICON_SIZE], &[], b"abc", MAX).unwrap();
        let mut padded = bytes.clone();
        padded.resize(1024, 0);

        let package = parse(&padded).unwrap();
        assert_eq!(package.payload, b"abc");
        assert_eq!(package.encoded_len(), bytes.len());
    }

    #[test]
    fn test_build_rejects_oversized_payload() {
        let header = sample_header();
        let payload = vec![0u8; 1000];
        let result = build(&header, &[0u8; ICON_SIZE], &[], &payload, 1024);
        assert!(matches!(
            result,
            Err(SaveError::PackageTooLarge { size: 1640, max: 1024 })
        ));
    }

    #[test]
    fn test_build_rejects_inconsistent_media() {
        let mut header = sample_header();
        assert!(matches!(
            build(&header, &[0u8; 100], &[], b"", MAX),
            Err(SaveError::InvalidPackage(_))
        ));

        header.eyecatch_type = EyecatchType::Rgb4444;
        assert!(matches!(
            build(&header, &[0u8; ICON_SIZE], &[], b"", MAX),
            Err(SaveError::InvalidPackage(_))
        ));

        header.eyecatch_type = EyecatchType::None;
        header.icon_count = 0;
        assert!(matches!(
            build(&header, &[], &[], b"", MAX),
            Err(SaveError::InvalidPackage(_))
        ));
    }

    #[test]
    fn test_parse_rejects_short_buffer() {
        assert!(matches!(parse(&[0u8; 64]), Err(SaveError::Decode(_))));

        let bytes = build(&sample_header(), &[0u8; ICON_SIZE], &[], b"0123456789", MAX).unwrap();
        assert!(matches!(
            parse(&bytes[..bytes.len() - 1]),
            Err(SaveError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_detects_corruption() {
        let mut bytes =
            build(&sample_header(), &[0u8; ICON_SIZE], &[], b"important", MAX).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(parse(&bytes), Err(SaveError::Decode(_))));
    }

    #[test]
    fn test_template_uses_label_for_long_description() {
        let template = PackageTemplate::new("Saved Game", "vmu-saves");
        let bytes = template
            .build("a rather long label that overflows the field", b"x", MAX)
            .unwrap();
        let package = parse(&bytes).unwrap();
        assert_eq!(
            package.header.long_description(),
            "a rather long label that overflo"
        );
        assert_eq!(template.overhead(), HEADER_SIZE + ICON_SIZE);
    }

    #[test]
    fn test_padded_text_replaces_non_ascii() {
        let field: [u8; 8] = padded_text("caf\u{e9}", b' ');
        assert_eq!(&field, b"caf??   ");
    }
}
