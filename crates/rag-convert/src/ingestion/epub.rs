//! EPUB package reading: container.xml, package document manifest, item content

use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use super::{DocumentItem, DocumentItemSource};
use crate::error::{Error, Result};

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Media types treated as document items
const DOCUMENT_MEDIA_TYPES: [&str; 2] = ["application/xhtml+xml", "text/html"];

/// Manifest entry of the package document
#[derive(Debug, Clone, PartialEq, Eq)]
struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
}

/// Reads document items out of an EPUB held in memory
pub struct EpubReader<'a> {
    filename: String,
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> EpubReader<'a> {
    /// Open the EPUB container; fails if the bytes are not a ZIP archive
    pub fn from_bytes(filename: &str, data: &'a [u8]) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| Error::extraction(filename, format!("Invalid EPUB archive: {}", e)))?;
        Ok(Self {
            filename: filename.to_string(),
            archive,
        })
    }

    fn read_entry(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut entry = self
            .archive
            .by_name(path)
            .map_err(|e| Error::extraction(&self.filename, format!("Missing {}: {}", path, e)))?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|e| Error::extraction(&self.filename, format!("Cannot read {}: {}", path, e)))?;
        Ok(buf)
    }

    /// Path of the package document, from META-INF/container.xml
    fn package_path(&mut self) -> Result<String> {
        let container = self.read_entry(CONTAINER_PATH)?;
        let xml = String::from_utf8_lossy(&container);
        let mut reader = Reader::from_str(&xml);
        reader.config_mut().trim_text(true);

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"rootfile" => {
                    if let Some(path) = self.attribute(&e, b"full-path")? {
                        return Ok(path);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::extraction(
                        &self.filename,
                        format!("Malformed {}: {}", CONTAINER_PATH, e),
                    ))
                }
                _ => {}
            }
        }

        Err(Error::extraction(
            &self.filename,
            "container.xml does not name a package document",
        ))
    }

    /// Manifest items in the order they are declared
    fn manifest(&self, opf: &str) -> Result<Vec<ManifestItem>> {
        let mut reader = Reader::from_str(opf);
        reader.config_mut().trim_text(true);

        let mut items = Vec::new();
        let mut in_manifest = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"manifest" => in_manifest = true,
                Ok(Event::End(e)) if e.local_name().as_ref() == b"manifest" => in_manifest = false,
                Ok(Event::Start(e)) | Ok(Event::Empty(e))
                    if in_manifest && e.local_name().as_ref() == b"item" =>
                {
                    let id = self.attribute(&e, b"id")?.unwrap_or_default();
                    let href = self.attribute(&e, b"href")?.unwrap_or_default();
                    let media_type = self.attribute(&e, b"media-type")?.unwrap_or_default();
                    if href.is_empty() {
                        tracing::debug!("Manifest item '{}' has no href, skipping", id);
                        continue;
                    }
                    items.push(ManifestItem {
                        id,
                        href,
                        media_type,
                    });
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::extraction(
                        &self.filename,
                        format!("Malformed package document: {}", e),
                    ))
                }
                _ => {}
            }
        }

        Ok(items)
    }

    fn attribute(&self, element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
        for attr in element.attributes() {
            let attr = attr.map_err(|e| Error::extraction(&self.filename, e))?;
            if attr.key.local_name().as_ref() == name {
                let value = attr
                    .unescape_value()
                    .map_err(|e| Error::extraction(&self.filename, e))?;
                return Ok(Some(value.into_owned()));
            }
        }
        Ok(None)
    }
}

impl DocumentItemSource for EpubReader<'_> {
    fn document_items(&mut self) -> Result<Vec<DocumentItem>> {
        let package_path = self.package_path()?;
        let package_dir = match package_path.rfind('/') {
            Some(i) => package_path[..=i].to_string(),
            None => String::new(),
        };
        tracing::debug!("EPUB package document: {}", package_path);

        let opf = self.read_entry(&package_path)?;
        let manifest = self.manifest(&String::from_utf8_lossy(&opf))?;

        let mut items = Vec::new();
        for item in manifest {
            if !DOCUMENT_MEDIA_TYPES.contains(&item.media_type.as_str()) {
                continue;
            }

            let file_name = urlencoding::decode(&item.href)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| item.href.clone());
            let entry_path = resolve_path(&package_dir, &file_name);
            let markup = self.read_entry(&entry_path)?;

            tracing::debug!("Document item {} -> {} ({} bytes)", item.id, entry_path, markup.len());
            items.push(DocumentItem { file_name, markup });
        }

        Ok(items)
    }
}

/// Join an href onto the package directory, resolving `.` and `..` segments
fn resolve_path(base_dir: &str, href: &str) -> String {
    let href = href.split(['#', '?']).next().unwrap_or_default();
    let mut segments: Vec<&str> = Vec::new();

    for segment in base_dir.split('/').chain(href.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    segments.join("/")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Build an EPUB whose package document lives in `OEBPS/`.
    ///
    /// `items` are (href, media type, content); each gets a manifest entry in order.
    pub fn epub_with_items(items: &[(&str, &str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("mimetype", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();

        zip.start_file("META-INF/container.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(
            br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
        )
        .unwrap();

        let mut manifest = String::new();
        let mut spine = String::new();
        for (i, (href, media_type, _)) in items.iter().enumerate() {
            manifest.push_str(&format!(
                "    <item id=\"item{}\" href=\"{}\" media-type=\"{}\"/>\n",
                i, href, media_type
            ));
            spine.push_str(&format!("    <itemref idref=\"item{}\"/>\n", i));
        }
        let opf = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Fixture</dc:title>
  </metadata>
  <manifest>
{}  </manifest>
  <spine>
{}  </spine>
</package>"#,
            manifest, spine
        );
        zip.start_file("OEBPS/content.opf", SimpleFileOptions::default()).unwrap();
        zip.write_all(opf.as_bytes()).unwrap();

        for (href, _, content) in items {
            let path = format!("OEBPS/{}", urlencoding::decode(href).unwrap());
            zip.start_file(path, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    pub fn xhtml(title: &str, body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>{}</title></head><body>{}</body></html>",
            title, body
        )
    }
}
