use bson::{Bson, Document, doc};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::errors::StoreError;

const FORMAT: &str = "doclayer-snapshot";
const VERSION: i32 = 1;

/// One collection as stored on disk.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct CollectionImage {
    pub name: String,
    pub unique_fields: Vec<String>,
    pub docs: Vec<Document>,
}

/// Writes a header, then per collection one descriptor followed by its
/// documents, as a stream of BSON documents. The file is replaced atomically.
pub(crate) fn write_snapshot(
    path: &Path,
    db_name: &str,
    collections: &[CollectionImage],
) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        doc! { "format": FORMAT, "version": VERSION, "db": db_name }.to_writer(&mut w)?;
        for c in collections {
            let unique: Vec<Bson> = c.unique_fields.iter().map(|f| Bson::String(f.clone())).collect();
            doc! { "collection": c.name.as_str(), "unique": unique }.to_writer(&mut w)?;
            for d in &c.docs {
                doc! { "c": c.name.as_str(), "d": d.clone() }.to_writer(&mut w)?;
            }
        }
        w.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error.to_string()))?;
    Ok(())
}

pub(crate) fn read_snapshot(path: &Path) -> Result<(String, Vec<CollectionImage>), StoreError> {
    let mut r = BufReader::new(File::open(path)?);
    let header = Document::from_reader(&mut r)?;
    if header.get_str("format").ok() != Some(FORMAT) {
        return Err(StoreError::SnapshotError(format!("{} is not a snapshot file", path.display())));
    }
    match header.get_i32("version") {
        Ok(VERSION) => {}
        _ => return Err(StoreError::SnapshotError("unsupported snapshot version".into())),
    }
    let db_name = header.get_str("db").unwrap_or_default().to_string();

    let mut out: Vec<CollectionImage> = Vec::new();
    while !r.fill_buf()?.is_empty() {
        let entry = Document::from_reader(&mut r)?;
        if let Ok(name) = entry.get_str("collection") {
            let unique_fields = entry
                .get_array("unique")
                .map(|a| a.iter().filter_map(|b| b.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            out.push(CollectionImage { name: name.to_string(), unique_fields, docs: Vec::new() });
            continue;
        }
        let (Ok(name), Ok(d)) = (entry.get_str("c"), entry.get_document("d")) else {
            return Err(StoreError::SnapshotError("malformed snapshot entry".into()));
        };
        match out.last_mut() {
            Some(c) if c.name == name => c.docs.push(d.clone()),
            _ => return Err(StoreError::SnapshotError(format!("document for undeclared collection {name}"))),
        }
    }
    Ok((db_name, out))
}
