//! Geo-IP lookup collaborator
//!
//! [`GeoLookup`] resolves an IP string to a city name. [`MaxMindDb`] reads a
//! MaxMind city database (`.mmdb`, e.g. GeoLite2-City) and returns the city
//! name in one configured language.
//!
//! [`RangeTable`] is a plain-text alternative: one `start,end,city` line per address range,
//! `#` starting a comment. IPv4 and IPv6 ranges may be mixed; IPv4 addresses
//! are compared in their IPv6-mapped form.
//!
//! ```text
//! # start,end,city
//! 1.0.1.0,1.0.3.255,Fuzhou
//! 1.0.8.0,1.0.15.255,Guangzhou
//! ```

use std::net::IpAddr;
use std::path::Path;

use maxminddb::{geoip2, MaxMindDBError, Reader};

use crate::utils::error::GeoError;

/// Resolve an IP address to a city name
pub trait GeoLookup: Send + Sync {
    fn city(&self, ip: &str) -> Result<String, GeoError>;
}

#[derive(Debug, Clone)]
struct Range {
    start: u128,
    end: u128,
    city: String,
}

/// Sorted range table loaded from a local file
#[derive(Debug, Clone, Default)]
pub struct RangeTable {
    ranges: Vec<Range>,
}

fn to_key(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(v4.to_ipv6_mapped()),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn parse_ip(text: &str) -> Result<IpAddr, GeoError> {
    text.trim()
        .parse::<IpAddr>()
        .map_err(|_| GeoError::InvalidAddress(text.to_string()))
}

impl RangeTable {
    /// Load a table from a file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GeoError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let table = Self::parse(&content)?;
        tracing::info!(
            path = %path.as_ref().display(),
            ranges = table.len(),
            "geo range table loaded"
        );
        Ok(table)
    }

    /// Parse table text
    pub fn parse(content: &str) -> Result<Self, GeoError> {
        let mut ranges = Vec::new();

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let malformed = |reason: &str| GeoError::Malformed {
                line: idx + 1,
                reason: reason.to_string(),
            };

            let mut fields = line.splitn(3, ',');
            let (Some(start), Some(end), Some(city)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(malformed("expected start,end,city"));
            };

            let start = parse_ip(start).map_err(|_| malformed("bad start address"))?;
            let end = parse_ip(end).map_err(|_| malformed("bad end address"))?;
            let (start, end) = (to_key(start), to_key(end));
            if start > end {
                return Err(malformed("start after end"));
            }

            ranges.push(Range {
                start,
                end,
                city: city.trim().to_string(),
            });
        }

        ranges.sort_by_key(|r| r.start);
        Ok(Self { ranges })
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl GeoLookup for RangeTable {
    fn city(&self, ip: &str) -> Result<String, GeoError> {
        let key = to_key(parse_ip(ip)?);

        // last range starting at or before the address
        let idx = self.ranges.partition_point(|r| r.start <= key);
        idx.checked_sub(1)
            .map(|i| &self.ranges[i])
            .filter(|r| key <= r.end)
            .map(|r| r.city.clone())
            .ok_or_else(|| GeoError::NotFound(ip.to_string()))
    }
}

/// MaxMind city database
pub struct MaxMindDb {
    reader: Reader<Vec<u8>>,
    language: String,
}

impl MaxMindDb {
    /// Load a database file; city names are read in `language` (e.g. `en`, `zh-CN`)
    pub fn open(path: impl AsRef<Path>, language: impl Into<String>) -> Result<Self, GeoError> {
        let reader = Reader::open_readfile(path.as_ref())
            .map_err(|e| GeoError::Database(e.to_string()))?;
        tracing::info!(
            path = %path.as_ref().display(),
            database_type = %reader.metadata.database_type,
            "maxmind database loaded"
        );
        Ok(Self {
            reader,
            language: language.into(),
        })
    }
}

impl GeoLookup for MaxMindDb {
    fn city(&self, ip: &str) -> Result<String, GeoError> {
        let address = parse_ip(ip)?;
        let record: geoip2::City<'_> = match self.reader.lookup(address) {
            Ok(record) => record,
            Err(MaxMindDBError::AddressNotFoundError(_)) => {
                return Err(GeoError::NotFound(ip.to_string()))
            }
            Err(e) => return Err(GeoError::Database(e.to_string())),
        };

        record
            .city
            .and_then(|city| city.names)
            .and_then(|names| names.get(self.language.as_str()).copied())
            .map(str::to_string)
            .ok_or_else(|| GeoError::NotFound(ip.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "\
# start,end,city
10.0.0.0,10.0.0.255,Hangzhou
1.0.1.0,1.0.3.255,Fuzhou

2001:db8::,2001:db8::ffff,Testville
";

    #[test]
    fn test_lookup_hits_and_misses() {
        let table = RangeTable::parse(TABLE).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.city("1.0.2.9").unwrap(), "Fuzhou");
        assert_eq!(table.city("10.0.0.255").unwrap(), "Hangzhou");
        assert_eq!(table.city("2001:db8::12").unwrap(), "Testville");
        assert!(matches!(table.city("10.0.1.0"), Err(GeoError::NotFound(_))));
        assert!(matches!(
            table.city("not-an-ip"),
            Err(GeoError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let err = RangeTable::parse("1.0.0.0,1.0.0.9,A\n1.0.0.9\n").unwrap_err();
        assert!(matches!(err, GeoError::Malformed { line: 2, .. }));

        let err = RangeTable::parse("1.0.0.9,1.0.0.1,Backwards\n").unwrap_err();
        assert!(matches!(err, GeoError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_open_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        let table = RangeTable::open(file.path()).unwrap();
        assert_eq!(table.city("1.0.1.1").unwrap(), "Fuzhou");

        assert!(matches!(
            RangeTable::open("/nonexistent/geo.csv"),
            Err(GeoError::Io(_))
        ));
    }

    #[test]
    fn test_maxmind_rejects_non_database_file() {
        let mut file = tempfile::Builder::new().suffix(".mmdb").tempfile().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();

        assert!(matches!(
            MaxMindDb::open(file.path(), "en"),
            Err(GeoError::Database(_))
        ));
        assert!(matches!(
            MaxMindDb::open("/nonexistent/GeoLite2-City.mmdb", "en"),
            Err(GeoError::Database(_))
        ));
    }
}
