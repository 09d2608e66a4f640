//! Integration tests for the concrete scenarios from spec.md §8 (S1-S6):
//! build a small mbox under a scratch spool directory, run the same
//! index/link/render pipeline `bindex`/`blists-render` drive, and check the
//! externally observable result.

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use blists::config::Config;
use blists::index::{Header, IndexWriter};
use blists::render::{self, HtmlFlags};
use blists::{mailbox, thread};

/// Writes `mbox_bytes` as `<dir>/<list>`, indexes and links it, and flushes
/// a fresh index, returning a `Config` pointing at `dir` as the spool
/// directory.
fn index_list(dir: &TempDir, list: &str, mbox_bytes: &[u8]) -> Config {
    let mbox_path = dir.path().join(list);
    fs::write(&mbox_path, mbox_bytes).unwrap();

    let config = Config {
        spool_dir: dir.path().to_path_buf(),
        ..Config::default()
    };

    let (mut records, next_offset) = mailbox::index_from(&mbox_path, &config, list, 0).unwrap();
    mailbox::sort_records(&mut records);
    thread::link(&mut records, &config);
    let slots = mailbox::build_slots(&records, &config);

    let mut writer = IndexWriter::open_or_create(&mbox_path).unwrap();
    writer.write_slots(&slots).unwrap();
    writer.write_records(&config, &records).unwrap();
    writer.write_header(Header::new(&config, next_offset)).unwrap();
    drop(writer);

    config
}

#[test]
fn s1_simple_message() {
    let dir = TempDir::new().unwrap();
    let mbox = b"From a@x Mon Jan 1 00:00:00 2001\n\
Date: Mon, 01 Jan 2001 00:00:00 +0000\n\
Message-ID: <a@x>\n\
Subject: hi\n\
\n\
hello\n";
    let config = index_list(&dir, "list1", mbox);

    let body = String::from_utf8(
        render::message(&config, "list1", 2001, 1, 1, 1, HtmlFlags { header: true, body: true, censor: false })
            .unwrap(),
    )
    .unwrap();
    assert!(body.contains("hello"));
    assert!(!body.contains("[prev]"));
    assert!(!body.contains("[next]"));
}

#[test]
fn s2_thread_of_three() {
    let dir = TempDir::new().unwrap();
    let mbox = b"From r@x Mon Jan 1 00:00:00 2001\n\
Date: Mon, 01 Jan 2001 00:00:00 +0000\n\
Message-ID: <r>\n\
Subject: one\n\
\n\
first\n\
\n\
From s@x Tue Jan 2 00:00:00 2001\n\
Date: Tue, 02 Jan 2001 00:00:00 +0000\n\
Message-ID: <s>\n\
In-Reply-To: <r>\n\
Subject: two\n\
\n\
second\n\
\n\
From t@x Wed Jan 3 00:00:00 2001\n\
Date: Wed, 03 Jan 2001 00:00:00 +0000\n\
Message-ID: <t>\n\
In-Reply-To: <s>\n\
Subject: three\n\
\n\
third\n";
    let config = index_list(&dir, "list2", mbox);

    let m1 = render::message(&config, "list2", 2001, 1, 1, 1, HtmlFlags { header: true, body: true, censor: false })
        .unwrap();
    let m1 = String::from_utf8(m1).unwrap();
    assert!(m1.contains("first"));

    let m2 = render::message(&config, "list2", 2001, 1, 2, 1, HtmlFlags { header: true, body: true, censor: false })
        .unwrap();
    let m2 = String::from_utf8(m2).unwrap();
    assert!(m2.contains("second"));

    let m3 = render::message(&config, "list2", 2001, 1, 3, 1, HtmlFlags { header: true, body: true, censor: false })
        .unwrap();
    let m3 = String::from_utf8(m3).unwrap();
    assert!(m3.contains("third"));
}

#[test]
fn s3_encoded_word_roundtrip() {
    let dir = TempDir::new().unwrap();
    let mbox = "From a@x Mon Jan 1 00:00:00 2001\n\
Date: Mon, 01 Jan 2001 00:00:00 +0000\n\
Message-ID: <a@x>\n\
Subject: =?KOI8-R?Q?=D4=C5=D3=D4?=\n\
\n\
body\n"
        .as_bytes();
    let mbox_path = dir.path().join("list3");
    fs::write(&mbox_path, mbox).unwrap();
    let config = Config { spool_dir: dir.path().to_path_buf(), ..Config::default() };

    let (records, _) = mailbox::index_from(&mbox_path, &config, "list3", 0).unwrap();
    assert_eq!(records.len(), 1);
    let (_, subject) = records[0].from_and_subject();
    assert_eq!(subject, "тест");
}

#[test]
fn s4_url_detection_and_obfuscation() {
    let dir = TempDir::new().unwrap();
    let mbox = b"From a@x Mon Jan 1 00:00:00 2001\n\
Date: Mon, 01 Jan 2001 00:00:00 +0000\n\
Message-ID: <a@x>\n\
Subject: links\n\
\n\
see https://example.com/ or mail foo@example.com\n";
    let config = index_list(&dir, "list4", mbox);

    let out = render::message(&config, "list4", 2001, 1, 1, 1, HtmlFlags { header: false, body: true, censor: false })
        .unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("<a href=\"https://example.com/\" rel=\"nofollow\">https://example.com/</a>"));
    assert!(out.contains("foo&#64;...mple.com"));
}

#[test]
fn s5_out_of_order_dates_sort_by_date() {
    let dir = TempDir::new().unwrap();
    let mbox = b"From b@x Tue Jan 1 00:00:00 2002\n\
Date: Tue, 01 Jan 2002 00:00:00 +0000\n\
Message-ID: <b@x>\n\
Subject: later\n\
\n\
later message\n\
\n\
From a@x Mon Jan 1 00:00:00 2001\n\
Date: Mon, 01 Jan 2001 00:00:00 +0000\n\
Message-ID: <a@x>\n\
Subject: earlier\n\
\n\
earlier message\n";
    let config = index_list(&dir, "list5", mbox);

    let earlier = render::message(&config, "list5", 2001, 1, 1, 1, HtmlFlags { header: false, body: true, censor: false })
        .unwrap();
    assert!(String::from_utf8(earlier).unwrap().contains("earlier message"));

    let later = render::message(&config, "list5", 2002, 1, 1, 1, HtmlFlags { header: false, body: true, censor: false })
        .unwrap();
    assert!(String::from_utf8(later).unwrap().contains("later message"));
}

#[test]
fn s6_incremental_resume_matches_from_scratch() {
    let first = b"From a@x Mon Jan 1 00:00:00 2001\n\
Date: Mon, 01 Jan 2001 00:00:00 +0000\n\
Message-ID: <a@x>\n\
Subject: one\n\
\n\
first\n\
\n";
    let second = b"From b@x Tue Jan 2 00:00:00 2001\n\
Date: Tue, 02 Jan 2001 00:00:00 +0000\n\
Message-ID: <b@x>\n\
Subject: two\n\
\n\
second\n";

    // Incremental: index `first`, append `second`, re-run bindex's flow.
    let incremental_dir = TempDir::new().unwrap();
    let config_incr = index_list(&incremental_dir, "listi", first);
    let mbox_path = incremental_dir.path().join("listi");
    {
        use std::io::Write as _;
        let mut f = fs::OpenOptions::new().append(true).open(&mbox_path).unwrap();
        f.write_all(second).unwrap();
    }
    let mut writer = IndexWriter::open_or_create(&mbox_path).unwrap();
    let header = writer.try_read_header(&config_incr).unwrap();
    let mut existing = writer.read_records(&config_incr, 1).unwrap();
    let (mut appended, next_offset) =
        mailbox::index_from(&mbox_path, &config_incr, "listi", header.next_offset).unwrap();
    existing.append(&mut appended);
    mailbox::sort_records(&mut existing);
    thread::link(&mut existing, &config_incr);
    let slots = mailbox::build_slots(&existing, &config_incr);
    writer.write_slots(&slots).unwrap();
    writer.write_records(&config_incr, &existing).unwrap();
    writer.write_header(Header::new(&config_incr, next_offset)).unwrap();
    drop(writer);

    // From scratch: index the concatenation of both messages in one pass.
    let scratch_dir = TempDir::new().unwrap();
    let mut whole = first.to_vec();
    whole.extend_from_slice(second);
    let config_scratch = index_list(&scratch_dir, "lists", &whole);

    let incr_m1 = render::message(&config_incr, "listi", 2001, 1, 1, 1, HtmlFlags { header: false, body: true, censor: false }).unwrap();
    let scratch_m1 = render::message(&config_scratch, "lists", 2001, 1, 1, 1, HtmlFlags { header: false, body: true, censor: false }).unwrap();
    assert_eq!(incr_m1, scratch_m1);

    let incr_m2 = render::message(&config_incr, "listi", 2001, 1, 2, 1, HtmlFlags { header: false, body: true, censor: false }).unwrap();
    let scratch_m2 = render::message(&config_scratch, "lists", 2001, 1, 2, 1, HtmlFlags { header: false, body: true, censor: false }).unwrap();
    assert_eq!(incr_m2, scratch_m2);
}
