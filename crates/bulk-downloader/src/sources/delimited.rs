//! Comma-separated source lists

use super::{SourceList, SourceWarning, is_download_url};

/// Which field of a delimited record holds the download URL
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UrlColumn {
    /// Column with this header; the first row is the header row
    Named(String),
    /// Zero-based field index in every row
    Index(usize),
    /// First field that is an http(s) URL
    #[default]
    Detect,
}

impl std::str::FromStr for UrlColumn {
    type Err = std::convert::Infallible;

    /// Numbers select by index, `auto` detects, anything else names a header
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("auto") || value.is_empty() {
            Ok(UrlColumn::Detect)
        } else if let Ok(index) = value.parse() {
            Ok(UrlColumn::Index(index))
        } else {
            Ok(UrlColumn::Named(value.to_string()))
        }
    }
}

/// Read download URLs from comma-separated text
pub fn parse_delimited(document: &str, origin: &str, column: &UrlColumn) -> SourceList {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(document.as_bytes());

    let mut list = SourceList::default();
    let mut named_index: Option<usize> = None;

    for (row, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line() as usize);
                list.warn(SourceWarning::new(origin, line, format!("malformed row: {}", e)));
                continue;
            }
        };
        let line = record.position().map(|p| p.line() as usize).or(Some(row + 1));

        let projected = match column {
            UrlColumn::Named(header) if row == 0 => {
                named_index = record.iter().position(|field| field.eq_ignore_ascii_case(header));
                if named_index.is_none() {
                    let mut missing = SourceList::default();
                    missing.warn(SourceWarning::new(origin, None, format!("no '{}' column in header row", header)));
                    return missing;
                }
                continue;
            }
            UrlColumn::Named(_) => named_index.and_then(|index| record.get(index)),
            UrlColumn::Index(index) => record.get(*index),
            UrlColumn::Detect => record.iter().find(|field| is_download_url(field)),
        };

        match projected {
            Some(url) if is_download_url(url) => list.urls.push(url.to_string()),
            _ if row == 0 && *column == UrlColumn::Detect => {}
            _ => list.warn(SourceWarning::new(origin, line, "row does not contain a download URL")),
        }
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_EXPORT: &str = "\
Granule Name,Platform,URL,Size (MB)
S1A_one,Sentinel-1A,https://datapool.asf.alaska.edu/SLC/SA/S1A_one.zip,4200.1
S1B_two,Sentinel-1B,https://datapool.asf.alaska.edu/SLC/SB/S1B_two.zip,4100.7
";

    #[test]
    fn test_detect_skips_header_silently() {
        let list = parse_delimited(SEARCH_EXPORT, "search.csv", &UrlColumn::Detect);
        assert_eq!(
            list.urls,
            vec![
                "https://datapool.asf.alaska.edu/SLC/SA/S1A_one.zip",
                "https://datapool.asf.alaska.edu/SLC/SB/S1B_two.zip",
            ]
        );
        assert!(list.warnings.is_empty());
    }

    #[test]
    fn test_named_column() {
        let list = parse_delimited(SEARCH_EXPORT, "search.csv", &UrlColumn::Named("url".to_string()));
        assert_eq!(list.urls.len(), 2);

        let missing = parse_delimited(SEARCH_EXPORT, "search.csv", &UrlColumn::Named("Download".to_string()));
        assert!(missing.urls.is_empty());
        assert_eq!(missing.warnings.len(), 1);
    }

    #[test]
    fn test_index_column_warns_on_rows_without_url() {
        let list = parse_delimited(SEARCH_EXPORT, "search.csv", &UrlColumn::Index(2));
        assert_eq!(list.urls.len(), 2);
        assert_eq!(list.warnings.len(), 1);
        assert_eq!(list.warnings[0].record, Some(1));
    }

    #[test]
    fn test_malformed_rows_are_skipped_with_warning() {
        let document = "https://example.com/a.zip\nnot a url,still not\n\nhttps://example.com/b.zip,extra\n";
        let list = parse_delimited(document, "mixed.csv", &UrlColumn::Detect);
        assert_eq!(list.urls, vec!["https://example.com/a.zip", "https://example.com/b.zip"]);
        assert_eq!(list.warnings.len(), 1);
        assert_eq!(list.warnings[0].record, Some(2));
    }

    #[test]
    fn test_column_selector_parsing() {
        assert_eq!("auto".parse::<UrlColumn>().unwrap(), UrlColumn::Detect);
        assert_eq!("3".parse::<UrlColumn>().unwrap(), UrlColumn::Index(3));
        assert_eq!("URL".parse::<UrlColumn>().unwrap(), UrlColumn::Named("URL".to_string()));
    }
}
