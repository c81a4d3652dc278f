//! Metalink document parsing
//!
//! Only the `files/file/resources/url` skeleton is read. Element names are
//! compared by local name, so default namespaces (`{uri}name` after
//! expansion) and prefixes (`ml:name`) are both ignored.

use quick_xml::Reader;
use quick_xml::events::Event;

use super::{SourceList, SourceWarning};

/// Strip a `{namespace}` or `prefix:` qualifier from an element name
pub fn local_name(name: &str) -> &str {
    let name = match name.rfind('}') {
        Some(index) => &name[index + 1..],
        None => name,
    };
    match name.rfind(':') {
        Some(index) => &name[index + 1..],
        None => name,
    }
}

/// Where the walker currently is relative to `root/files/file/resources/url`
#[derive(Default)]
struct Walker {
    stack: Vec<String>,
    saw_files: bool,
    file_index: usize,
    /// First URL of the `file` element currently open
    current: Option<String>,
    text: Option<String>,
}

impl Walker {
    fn at(&self, path: &[&str]) -> bool {
        self.stack.len() == path.len() + 1 && self.stack[1..].iter().zip(path).all(|(a, b)| a == b)
    }

    fn open(&mut self, name: &str) {
        self.stack.push(local_name(name).to_string());
        if self.at(&["files"]) {
            self.saw_files = true;
        } else if self.at(&["files", "file"]) {
            self.file_index += 1;
            self.current = None;
        } else if self.at(&["files", "file", "resources", "url"]) {
            self.text = Some(String::new());
        }
    }

    fn close(&mut self, list: &mut SourceList, origin: &str) {
        if self.at(&["files", "file", "resources", "url"]) {
            if let Some(text) = self.text.take() {
                let url = text.trim();
                if self.current.is_none() && !url.is_empty() {
                    self.current = Some(url.to_string());
                }
            }
        } else if self.at(&["files", "file"]) {
            match self.current.take() {
                Some(url) => list.urls.push(url),
                None => list.warn(SourceWarning::new(origin, Some(self.file_index), "file entry has no resources/url")),
            }
        }
        self.stack.pop();
    }
}

/// Read the first URL of every `file` entry, in document order
///
/// Malformed XML or a document without a `files` element yields no URLs and
/// a single warning.
pub fn parse_metalink(document: &str, origin: &str) -> SourceList {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut list = SourceList::default();
    let mut walker = Walker::default();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                let mut failed = SourceList::default();
                failed.warn(SourceWarning::new(
                    origin,
                    None,
                    format!("invalid XML at byte {}: {}", reader.buffer_position(), e),
                ));
                return failed;
            }
        };

        match event {
            Event::Start(element) => {
                walker.open(&String::from_utf8_lossy(element.name().as_ref()));
            }
            Event::Empty(element) => {
                walker.open(&String::from_utf8_lossy(element.name().as_ref()));
                walker.close(&mut list, origin);
            }
            Event::End(_) => walker.close(&mut list, origin),
            Event::Text(text) => {
                if let Some(buffer) = walker.text.as_mut() {
                    match text.unescape() {
                        Ok(value) => buffer.push_str(&value),
                        Err(_) => buffer.push_str(&String::from_utf8_lossy(&text)),
                    }
                }
            }
            Event::CData(data) => {
                if let Some(buffer) = walker.text.as_mut() {
                    buffer.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !walker.saw_files {
        let mut empty = SourceList::default();
        empty.warn(SourceWarning::new(origin, None, "no <files> element found"));
        return empty;
    }

    list
}
