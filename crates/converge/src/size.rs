//! Disk size parsing and formatting
//!
//! Sizes use binary multipliers: `K` = 1024, `M` = 1024², `G` = 1024³,
//! `T` = 1024⁴. A trailing `B` or `iB` is accepted (`32G`, `32GB`, `32GiB`),
//! and a bare number is bytes.

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// Parse a size string into bytes
pub fn parse_size(size_str: &str) -> Result<u64, String> {
    let upper = size_str.trim().to_uppercase();

    if upper.is_empty() {
        return Err("empty size string".to_string());
    }

    let unit_less = upper
        .strip_suffix("IB")
        .or_else(|| upper.strip_suffix('B'))
        .unwrap_or(&upper);

    let (num_str, multiplier) = if let Some(num) = unit_less.strip_suffix('T') {
        (num, TIB)
    } else if let Some(num) = unit_less.strip_suffix('G') {
        (num, GIB)
    } else if let Some(num) = unit_less.strip_suffix('M') {
        (num, MIB)
    } else if let Some(num) = unit_less.strip_suffix('K') {
        (num, KIB)
    } else {
        (unit_less, 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid size '{}'", size_str.trim()))?;

    if !num.is_finite() || num < 0.0 {
        return Err(format!("invalid size '{}'", size_str.trim()));
    }

    Ok((num * multiplier as f64) as u64)
}

/// Format bytes with the largest whole binary unit (`32G`, `1536M`)
pub fn format_size(bytes: u64) -> String {
    for (unit, factor) in [("T", TIB), ("G", GIB), ("M", MIB), ("K", KIB)] {
        if bytes >= factor && bytes % factor == 0 {
            return format!("{}{unit}", bytes / factor);
        }
    }
    bytes.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("4K").unwrap(), 4 * KIB);
        assert_eq!(parse_size("512M").unwrap(), 512 * MIB);
        assert_eq!(parse_size("32G").unwrap(), 32 * GIB);
        assert_eq!(parse_size("2T").unwrap(), 2 * TIB);
    }

    #[test]
    fn test_parse_size_variants() {
        assert_eq!(parse_size("32g").unwrap(), 32 * GIB);
        assert_eq!(parse_size("32GB").unwrap(), 32 * GIB);
        assert_eq!(parse_size("32GiB").unwrap(), 32 * GIB);
        assert_eq!(parse_size(" 1.5G ").unwrap(), GIB + GIB / 2);
    }

    #[test]
    fn test_parse_size_errors() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("-1G").is_err());
        assert!(parse_size("G").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(32 * GIB), "32G");
        assert_eq!(format_size(1536 * MIB), "1536M");
        assert_eq!(format_size(1000), "1000");
    }
}
