//! HTTP byte-range helpers
//!
//! Only single `bytes=start-end` ranges (end optional) are understood;
//! anything else is treated as absent and the full resource is served.

/// A requested byte span, `end` inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Parse a `Range` request header value
    pub fn parse(header: &str) -> Option<Self> {
        let set = header.trim().strip_prefix("bytes=")?;
        if set.contains(',') {
            return None;
        }

        let (start, end) = set.split_once('-')?;
        let start = start.trim();
        if start.is_empty() {
            return None;
        }
        let start: u64 = start.parse().ok()?;

        let end = end.trim();
        let end = if end.is_empty() {
            None
        } else {
            let end: u64 = end.parse().ok()?;
            if end < start {
                return None;
            }
            Some(end)
        };

        Some(Self { start, end })
    }

    /// Value for an outgoing `Range` header
    pub fn to_header(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }

    /// Concrete inclusive span within a resource of `total` bytes.
    ///
    /// `None` when the range starts past the end.
    pub fn resolve(&self, total: u64) -> Option<(u64, u64)> {
        if total == 0 || self.start >= total {
            return None;
        }
        let last = total - 1;
        let end = self.end.map(|e| e.min(last)).unwrap_or(last);
        Some((self.start, end))
    }
}

/// A parsed `Content-Range` response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    /// `None` for `/*`
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = rest.split_once('/')?;
        let (start, end) = span.trim().split_once('-')?;
        let start: u64 = start.trim().parse().ok()?;
        let end: u64 = end.trim().parse().ok()?;
        // The span length must itself fit in a u64
        if end < start || (end - start).checked_add(1).is_none() {
            return None;
        }

        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse().ok()?),
        };
        if total.is_some_and(|total: u64| end >= total) {
            return None;
        }

        Some(Self { start, end, total })
    }

    /// Number of bytes in the span
    pub fn span_len(&self) -> u64 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    /// `bytes start-end/total`
    pub fn to_header(&self) -> String {
        match self.total {
            Some(total) => format!("bytes {}-{}/{}", self.start, self.end, total),
            None => format!("bytes {}-{}/*", self.start, self.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_closed_range() {
        assert_eq!(
            ByteRange::parse("bytes=100-199"),
            Some(ByteRange { start: 100, end: Some(199) })
        );
    }

    #[test]
    fn test_parse_open_range() {
        assert_eq!(
            ByteRange::parse("bytes=500-"),
            Some(ByteRange { start: 500, end: None })
        );
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert_eq!(ByteRange::parse("bytes=-500"), None);
        assert_eq!(ByteRange::parse("bytes=0-1,5-9"), None);
        assert_eq!(ByteRange::parse("items=0-1"), None);
        assert_eq!(ByteRange::parse("bytes=9-1"), None);
        assert_eq!(ByteRange::parse("bytes=abc-"), None);
    }

    #[test]
    fn test_resolve() {
        let open = ByteRange { start: 100, end: None };
        assert_eq!(open.resolve(1000), Some((100, 999)));

        let past_end = ByteRange { start: 900, end: Some(5000) };
        assert_eq!(past_end.resolve(1000), Some((900, 999)));

        let beyond = ByteRange { start: 1000, end: None };
        assert_eq!(beyond.resolve(1000), None);
    }

    #[test]
    fn test_to_header() {
        assert_eq!(ByteRange { start: 0, end: Some(99) }.to_header(), "bytes=0-99");
        assert_eq!(ByteRange { start: 7, end: None }.to_header(), "bytes=7-");
    }

    #[test]
    fn test_content_range() {
        let cr = ContentRange::parse("bytes 100-199/1000").unwrap();
        assert_eq!(cr.span_len(), 100);
        assert_eq!(cr.total, Some(1000));
        assert_eq!(cr.to_header(), "bytes 100-199/1000");

        let unknown = ContentRange::parse("bytes 0-9/*").unwrap();
        assert_eq!(unknown.total, None);

        assert!(ContentRange::parse("bytes */1000").is_none());
    }

    #[test]
    fn test_content_range_rejects_oversized_span() {
        assert!(ContentRange::parse("bytes 0-18446744073709551615/*").is_none());
        assert!(ContentRange::parse("bytes 0-999/1000").is_some());
        assert!(ContentRange::parse("bytes 0-1000/1000").is_none());

        let last = ContentRange::parse("bytes 1-18446744073709551615/*").unwrap();
        assert_eq!(last.span_len(), u64::MAX);
    }
}
