use codex_mem::util::{clip_chars, normalize_source_ref};

#[test]
fn ascii_no_clip() {
    assert_eq!(clip_chars("hello", 10), "hello");
    assert_eq!(clip_chars("hello", 5), "hello");
}

#[test]
fn ascii_clip() {
    assert_eq!(clip_chars("hello world", 5), "hello");
}

#[test]
fn cjk_clip() {
    assert_eq!(clip_chars("你好世界测试", 4), "你好世界");
}

#[test]
fn empty_string() {
    assert_eq!(clip_chars("", 5), "");
}

#[test]
fn source_refs_use_forward_slashes() {
    assert_eq!(normalize_source_ref(" docs\\decisions.md "), "docs/decisions.md");
    assert_eq!(normalize_source_ref("docs/a.md"), "docs/a.md");
}
