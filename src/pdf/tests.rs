use std::fs;
use std::path::PathBuf;

use lopdf::{Document, Object, dictionary};

use super::chunker::{PageRange, extrapolate_chars, render_marked_pages, split_form_feed_pages};
use super::outline::{
    attach_outline, backup_path_for, decode_text_string, encode_text_string, outline_entries,
    validate_outline,
};
use super::*;
use crate::model::TocEntry;

pub(crate) fn sample_document(page_total: u32) -> Document {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();

    let mut kids = Vec::new();
    for _ in 0..page_total {
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_total as i64,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    document
}

pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pdftoc_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("scratch directory should be created");
    dir
}

fn entry(title: &str, level: u32, page: u32) -> TocEntry {
    TocEntry {
        title: title.to_string(),
        level,
        page,
    }
}

fn sample_entries() -> Vec<TocEntry> {
    vec![
        entry("第一章 概述", 1, 1),
        entry("1.1 背景", 2, 2),
        entry("1.1.1 Scope", 3, 2),
        entry("1.2 目标", 2, 3),
        entry("第二章 方法", 1, 4),
    ]
}

#[test]
fn plan_ranges_covers_every_page_once() {
    let ranges = plan_ranges(2500, 1000);
    assert_eq!(
        ranges,
        vec![
            PageRange {
                start: 1,
                end: 1000
            },
            PageRange {
                start: 1001,
                end: 2000
            },
            PageRange {
                start: 2001,
                end: 2500
            },
        ]
    );

    for window in ranges.windows(2) {
        assert_eq!(window[0].end + 1, window[1].start);
    }
}

#[test]
fn plan_ranges_edge_cases() {
    assert!(plan_ranges(0, 1000).is_empty());
    assert_eq!(plan_ranges(1000, 1000).len(), 1);
    assert_eq!(plan_ranges(1001, 1000).len(), 2);
    assert_eq!(plan_ranges(3, 0).len(), 3);
}

#[test]
fn split_document_produces_standalone_chunks() {
    let document = sample_document(5);
    let chunks =
        split_document(&document, &plan_ranges(5, 2)).expect("document should split cleanly");

    let spans = chunks
        .iter()
        .map(|chunk| (chunk.start_page, chunk.end_page))
        .collect::<Vec<_>>();
    assert_eq!(spans, vec![(1, 2), (3, 4), (5, 5)]);

    let counts = chunks
        .iter()
        .map(|chunk| {
            let part = Document::load_mem(&chunk.bytes).expect("chunk should be a valid PDF");
            page_count(&part)
        })
        .collect::<Vec<_>>();
    assert_eq!(counts, vec![2, 2, 1]);
}

#[test]
fn form_feed_split_drops_trailing_blank_pages() {
    let pages = split_form_feed_pages("first\u{000C}sec\u{0000}ond\u{000C}\n\u{000C}");
    assert_eq!(pages, vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn marked_pages_carry_absolute_numbers() {
    let text = render_marked_pages(&["alpha".to_string(), "beta".to_string()], 101);
    assert_eq!(text, "\n--- page 101 ---\nalpha\n--- page 102 ---\nbeta");
}

#[test]
fn text_size_estimate_keeps_remainder_of_sample_average() {
    assert_eq!(extrapolate_chars(1004, 5, 1000), 200_800);
    assert_eq!(extrapolate_chars(7, 3, 3), 7);
    assert_eq!(extrapolate_chars(0, 5, 40), 0);
    assert_eq!(extrapolate_chars(10, 0, 40), 0);
}

#[test]
fn validate_outline_clamps_pages() {
    let validated = validate_outline(&[entry("Intro", 1, 0), entry("Tail", 2, 99)], 10)
        .expect("entries should validate");
    assert_eq!(validated, vec![entry("Intro", 1, 1), entry("Tail", 2, 10)]);
}

#[test]
fn validate_outline_rejects_bad_entries() {
    assert!(validate_outline(&[entry("  ", 1, 1)], 10).is_err());
    assert!(validate_outline(&[entry("Deep", 11, 1)], 10).is_err());
    assert!(validate_outline(&[entry("Zero", 0, 1)], 10).is_err());
    assert!(validate_outline(&[entry("Intro", 1, 1)], 0).is_err());
    assert!(
        validate_outline(&[], 3)
            .expect("empty outline is valid")
            .is_empty()
    );
}

#[test]
fn text_strings_round_trip_through_pdf_encoding() {
    match encode_text_string("Methods") {
        Object::String(bytes, _) => assert_eq!(bytes, b"Methods".to_vec()),
        other => panic!("unexpected object {other:?}"),
    }

    match encode_text_string("第一章") {
        Object::String(bytes, _) => {
            assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
            assert_eq!(decode_text_string(&bytes), "第一章");
        }
        other => panic!("unexpected object {other:?}"),
    }
}

#[test]
fn attached_outline_reads_back_in_order() {
    let mut document = sample_document(5);
    attach_outline(&mut document, &sample_entries()).expect("outline should attach");

    let mut bytes = Vec::new();
    document
        .save_to(&mut bytes)
        .expect("document should serialize");
    let reloaded = Document::load_mem(&bytes).expect("document should reload");

    assert_eq!(outline_entries(&reloaded), sample_entries());
}

#[test]
fn attached_outline_counts_descendants() {
    let mut document = sample_document(5);
    let root_id = attach_outline(&mut document, &sample_entries())
        .expect("outline should attach")
        .expect("non-empty outline has a root");

    let root = document
        .get_object(root_id)
        .and_then(|object| object.as_dict())
        .expect("root should be a dictionary");
    assert_eq!(root.get(b"Count").and_then(|count| count.as_i64()).ok(), Some(5));

    let first_id = root
        .get(b"First")
        .and_then(|first| first.as_reference())
        .expect("root should have a first child");
    let first = document
        .get_object(first_id)
        .and_then(|object| object.as_dict())
        .expect("first item should be a dictionary");
    assert_eq!(first.get(b"Count").and_then(|count| count.as_i64()).ok(), Some(3));
}

#[test]
fn empty_outline_leaves_document_untouched() {
    let mut document = sample_document(2);
    let root = attach_outline(&mut document, &[]).expect("empty outline should be accepted");
    assert!(root.is_none());
    assert!(outline_entries(&document).is_empty());
}

#[test]
fn backup_names_avoid_existing_files() {
    let dir = scratch_dir("backup_names");
    let source = dir.join("report.pdf");

    assert_eq!(backup_path_for(&source), dir.join("report_backup.pdf"));

    fs::write(dir.join("report_backup.pdf"), b"x").expect("backup fixture should write");
    assert_eq!(backup_path_for(&source), dir.join("report_backup_1.pdf"));

    fs::write(dir.join("report_backup_1.pdf"), b"x").expect("backup fixture should write");
    assert_eq!(backup_path_for(&source), dir.join("report_backup_2.pdf"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn write_outline_in_place_backs_up_and_replaces() {
    let dir = scratch_dir("write_in_place");
    let path = dir.join("paper.pdf");
    sample_document(5)
        .save(&path)
        .expect("fixture PDF should save");

    let first = write_outline(&path, &sample_entries(), None, true)
        .expect("first outline should write");
    assert_eq!(first.output, path);
    assert_eq!(first.backup, Some(dir.join("paper_backup.pdf")));
    assert_eq!(first.replaced_entries, 0);
    assert!(dir.join("paper_backup.pdf").exists());

    let replacement = vec![entry("Overview", 1, 1), entry("Details", 2, 9)];
    let second =
        write_outline(&path, &replacement, None, false).expect("second outline should write");
    assert_eq!(second.backup, None);
    assert_eq!(second.replaced_entries, 5);

    let read_back = read_outline(&path).expect("outline should read back");
    assert_eq!(read_back, vec![entry("Overview", 1, 1), entry("Details", 2, 5)]);

    let original = read_outline(&dir.join("paper_backup.pdf")).expect("backup should load");
    assert!(original.is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn write_outline_to_new_file_skips_backup() {
    let dir = scratch_dir("write_copy");
    let input = dir.join("source.pdf");
    let output = dir.join("out").join("with_toc.pdf");
    sample_document(3)
        .save(&input)
        .expect("fixture PDF should save");

    let outcome = write_outline(&input, &[entry("Intro", 1, 1)], Some(&output), true)
        .expect("outline should write to a new file");
    assert_eq!(outcome.output, output);
    assert_eq!(outcome.backup, None);
    assert!(!dir.join("source_backup.pdf").exists());
    assert!(read_outline(&input).expect("input should load").is_empty());
    assert_eq!(
        read_outline(&output).expect("output should load"),
        vec![entry("Intro", 1, 1)]
    );

    let _ = fs::remove_dir_all(&dir);
}
