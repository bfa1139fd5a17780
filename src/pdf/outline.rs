use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use tracing::{info, warn};

use super::chunker::{load_document, page_count};
use crate::model::TocEntry;

/// Deepest bookmark level accepted by the sink.
pub const MAX_OUTLINE_LEVEL: u32 = 10;
const MAX_WALK_DEPTH: u32 = 64;

#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub output: PathBuf,
    pub backup: Option<PathBuf>,
    pub replaced_entries: usize,
    pub written_entries: usize,
}

/// Checks entries against the document before they become bookmarks.
///
/// Out-of-range pages are clamped into `[1, total_pages]`; empty titles and levels outside
/// `[1, MAX_OUTLINE_LEVEL]` are rejected.
pub fn validate_outline(entries: &[TocEntry], total_pages: u32) -> Result<Vec<TocEntry>> {
    if total_pages == 0 {
        bail!("document has no pages to attach an outline to");
    }

    let mut validated = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.title.trim().is_empty() {
            bail!("outline entry on page {} has an empty title", entry.page);
        }
        if !(1..=MAX_OUTLINE_LEVEL).contains(&entry.level) {
            bail!(
                "outline entry {:?} has level {} outside 1-{}",
                entry.title,
                entry.level,
                MAX_OUTLINE_LEVEL
            );
        }

        let page = entry.page.clamp(1, total_pages);
        if page != entry.page {
            warn!(
                title = %entry.title,
                page = entry.page,
                total_pages,
                clamped = page,
                "outline page out of range"
            );
        }

        validated.push(TocEntry {
            title: entry.title.clone(),
            level: entry.level,
            page,
        });
    }

    Ok(validated)
}

/// Replaces the bookmark tree of `input` with `entries` and saves the result.
///
/// Without `output` the file is rewritten in place, after an optional backup copy.
pub fn write_outline(
    input: &Path,
    entries: &[TocEntry],
    output: Option<&Path>,
    backup: bool,
) -> Result<WriteOutcome> {
    let target = output.unwrap_or(input);
    let in_place = same_file(input, target);

    let backup_path = if backup && in_place {
        let path = create_backup(input)?;
        info!(backup = %path.display(), "backed up original PDF");
        Some(path)
    } else {
        None
    };

    let mut document = load_document(input)?;
    let replaced_entries = outline_entries(&document).len();
    let validated = validate_outline(entries, page_count(&document))?;

    attach_outline(&mut document, &validated)?;
    document.prune_objects();

    if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        crate::util::ensure_directory(parent)?;
    }
    save_replacing(&mut document, target)?;

    info!(
        output = %target.display(),
        replaced = replaced_entries,
        written = validated.len(),
        "wrote PDF outline"
    );

    Ok(WriteOutcome {
        output: target.to_path_buf(),
        backup: backup_path,
        replaced_entries,
        written_entries: validated.len(),
    })
}

pub fn read_outline(path: &Path) -> Result<Vec<TocEntry>> {
    let document = load_document(path)?;
    Ok(outline_entries(&document))
}

/// Builds a fresh `/Outlines` tree from `entries` and points the catalog at it.
///
/// Entries must already satisfy `validate_outline`; parents are chosen with a level stack so
/// each entry nests under the closest preceding shallower entry.
pub fn attach_outline(document: &mut Document, entries: &[TocEntry]) -> Result<Option<ObjectId>> {
    if entries.is_empty() {
        return Ok(None);
    }

    let pages = document.get_pages();
    let root_id = document.new_object_id();
    let ids = entries
        .iter()
        .map(|_| document.new_object_id())
        .collect::<Vec<ObjectId>>();

    let parents = parent_indices(entries);
    let descendants = descendant_counts(&parents);

    let mut children = vec![Vec::<usize>::new(); entries.len()];
    let mut top_level = Vec::new();
    for (index, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(index),
            None => top_level.push(index),
        }
    }

    let mut prev = vec![None; entries.len()];
    let mut next = vec![None; entries.len()];
    for siblings in children.iter().chain(std::iter::once(&top_level)) {
        for pair in siblings.windows(2) {
            next[pair[0]] = Some(pair[1]);
            prev[pair[1]] = Some(pair[0]);
        }
    }

    for (index, entry) in entries.iter().enumerate() {
        let page_id = pages
            .get(&entry.page)
            .copied()
            .with_context(|| format!("page {} not found for outline entry", entry.page))?;

        let mut item = Dictionary::new();
        item.set("Title", encode_text_string(&entry.title));
        item.set(
            "Parent",
            Object::Reference(parents[index].map(|parent| ids[parent]).unwrap_or(root_id)),
        );
        if let Some(previous) = prev[index] {
            item.set("Prev", Object::Reference(ids[previous]));
        }
        if let Some(following) = next[index] {
            item.set("Next", Object::Reference(ids[following]));
        }
        if let (Some(first), Some(last)) = (children[index].first(), children[index].last()) {
            item.set("First", Object::Reference(ids[*first]));
            item.set("Last", Object::Reference(ids[*last]));
            item.set("Count", Object::Integer(descendants[index] as i64));
        }
        item.set(
            "Dest",
            Object::Array(vec![
                Object::Reference(page_id),
                Object::Name(b"XYZ".to_vec()),
                Object::Null,
                Object::Null,
                Object::Null,
            ]),
        );

        document.objects.insert(ids[index], Object::Dictionary(item));
    }

    let mut root = Dictionary::new();
    root.set("Type", Object::Name(b"Outlines".to_vec()));
    if let (Some(first), Some(last)) = (top_level.first(), top_level.last()) {
        root.set("First", Object::Reference(ids[*first]));
        root.set("Last", Object::Reference(ids[*last]));
    }
    root.set("Count", Object::Integer(entries.len() as i64));
    document.objects.insert(root_id, Object::Dictionary(root));

    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(|root| root.as_reference())
        .context("PDF trailer has no catalog reference")?;
    let catalog = document
        .get_object_mut(catalog_id)
        .and_then(|object| object.as_dict_mut())
        .context("PDF catalog is not a dictionary")?;
    catalog.set("Outlines", Object::Reference(root_id));
    catalog.set("PageMode", Object::Name(b"UseOutlines".to_vec()));

    Ok(Some(root_id))
}

/// Flattens the document's bookmark tree in reading order.
///
/// Destinations that cannot be resolved to a page (named destinations, broken references)
/// are reported as page 0.
pub fn outline_entries(document: &Document) -> Vec<TocEntry> {
    let Some(first) = first_outline_item(document) else {
        return Vec::new();
    };

    let page_numbers = document
        .get_pages()
        .into_iter()
        .map(|(number, id)| (id, number))
        .collect::<HashMap<ObjectId, u32>>();

    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(first, 1u32)];

    while let Some((id, level)) = stack.pop() {
        if level > MAX_WALK_DEPTH || !visited.insert(id) {
            continue;
        }
        let Some(item) = document
            .get_object(id)
            .ok()
            .and_then(|object| object.as_dict().ok())
        else {
            continue;
        };

        let title = item
            .get(b"Title")
            .ok()
            .and_then(|value| resolve(document, value))
            .and_then(|value| match value {
                Object::String(bytes, _) => Some(decode_text_string(bytes)),
                _ => None,
            })
            .unwrap_or_default();

        entries.push(TocEntry {
            title,
            level,
            page: destination_page(document, item, &page_numbers).unwrap_or(0),
        });

        if let Ok(Object::Reference(sibling)) = item.get(b"Next") {
            stack.push((*sibling, level));
        }
        if let Ok(Object::Reference(child)) = item.get(b"First") {
            stack.push((*child, level + 1));
        }
    }

    entries
}

fn first_outline_item(document: &Document) -> Option<ObjectId> {
    let catalog = document
        .trailer
        .get(b"Root")
        .ok()
        .and_then(|root| resolve(document, root))?
        .as_dict()
        .ok()?;
    let outlines = catalog
        .get(b"Outlines")
        .ok()
        .and_then(|outlines| resolve(document, outlines))?
        .as_dict()
        .ok()?;

    match outlines.get(b"First") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    }
}

fn destination_page(
    document: &Document,
    item: &Dictionary,
    page_numbers: &HashMap<ObjectId, u32>,
) -> Option<u32> {
    let destination = match item.get(b"Dest") {
        Ok(dest) => resolve(document, dest)?,
        Err(_) => {
            let action = item
                .get(b"A")
                .ok()
                .and_then(|action| resolve(document, action))?
                .as_dict()
                .ok()?;
            resolve(document, action.get(b"D").ok()?)?
        }
    };

    match destination.as_array().ok()?.first()? {
        Object::Reference(page_id) => page_numbers.get(page_id).copied(),
        _ => None,
    }
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn parent_indices(entries: &[TocEntry]) -> Vec<Option<usize>> {
    let mut open: Vec<(u32, usize)> = Vec::new();
    let mut parents = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        while open.last().is_some_and(|(level, _)| *level >= entry.level) {
            open.pop();
        }
        parents.push(open.last().map(|(_, parent)| *parent));
        open.push((entry.level, index));
    }

    parents
}

// Children always follow their parent, so a reverse sweep sees every subtree total
// before it is added to the parent.
fn descendant_counts(parents: &[Option<usize>]) -> Vec<usize> {
    let mut counts = vec![0usize; parents.len()];
    for index in (0..parents.len()).rev() {
        if let Some(parent) = parents[index] {
            counts[parent] += 1 + counts[index];
        }
    }
    counts
}

pub fn encode_text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<u16>>();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|byte| char::from(*byte)).collect()
}

/// First free `<stem>_backup.pdf` / `<stem>_backup_N.pdf` next to `path`.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("document");
    let directory = path.parent().unwrap_or_else(|| Path::new(""));

    let mut candidate = directory.join(format!("{stem}_backup.pdf"));
    let mut counter = 1;
    while candidate.exists() {
        candidate = directory.join(format!("{stem}_backup_{counter}.pdf"));
        counter += 1;
    }
    candidate
}

pub fn create_backup(path: &Path) -> Result<PathBuf> {
    let backup = backup_path_for(path);
    fs::copy(path, &backup).with_context(|| {
        format!(
            "failed to back up {} to {}",
            path.display(),
            backup.display()
        )
    })?;
    Ok(backup)
}

fn save_replacing(document: &mut Document, target: &Path) -> Result<()> {
    let staging = target.with_extension("pdf.partial");
    document
        .save(&staging)
        .with_context(|| format!("failed to save PDF to {}", staging.display()))?;
    fs::rename(&staging, target).with_context(|| {
        format!(
            "failed to move {} over {}",
            staging.display(),
            target.display()
        )
    })?;
    Ok(())
}

fn same_file(left: &Path, right: &Path) -> bool {
    if left == right {
        return true;
    }
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}
