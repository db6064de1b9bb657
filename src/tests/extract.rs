use crate::errors::ReaderError;
use crate::extract::{extract_text, GENERIC, GUTENBERG, MIN_TEXT_CHARS};

#[test]
fn nav_and_script_only_is_extraction_error() {
    let html = r#"<html><head><style>p { color: red }</style></head><body>
        <nav>Home | Books | About</nav>
        <script>window.analytics = true;</script>
    </body></html>"#;

    let err = extract_text(html, &GENERIC).unwrap_err();
    assert!(matches!(err, ReaderError::ContentExtraction(_)));
}

#[test]
fn blocks_become_paragraphs_in_document_order() {
    let html = r#"<html><body>
        <header>Site header</header>
        <main>
            <h1>CHAPTER I</h1>
            <p>It was a   bright cold day in April,
               and the clocks were striking thirteen.</p>
            <blockquote>Quoted passage that is long enough to count as real prose text.</blockquote>
            <ul><li><p>Nested item paragraph</p></li></ul>
        </main>
        <footer>Copyright</footer>
    </body></html>"#;

    let text = extract_text(html, &GENERIC).unwrap();
    assert_eq!(
        text,
        "CHAPTER I\n\nIt was a bright cold day in April, and the clocks were striking thirteen.\n\nQuoted passage that is long enough to count as real prose text.\n\nNested item paragraph"
    );
}

#[test]
fn short_block_text_falls_back_to_raw_text() {
    let html = "<html><body><div>First raw chunk.\n\nSecond raw chunk.</div><p>tiny</p></body></html>";
    assert!("tiny".len() < MIN_TEXT_CHARS);

    let text = extract_text(html, &GENERIC).unwrap();
    assert!(text.starts_with("First raw chunk.\n\nSecond raw chunk."));
}

#[test]
fn gutenberg_strategy_drops_boilerplate_sections() {
    let html = r#"<html><body>
        <section class="pg-boilerplate" id="pg-header">The Project Gutenberg eBook of Moby Dick</section>
        <h2>CHAPTER 1. Loomings.</h2>
        <p>Call me Ishmael. Some years ago, never mind how long precisely, having little or no money in my purse.</p>
        <section class="pg-boilerplate" id="pg-footer">Updated editions will replace the previous one.</section>
    </body></html>"#;

    let text = extract_text(html, &GUTENBERG).unwrap();
    assert!(text.starts_with("CHAPTER 1. Loomings."));
    assert!(!text.contains("Project Gutenberg"));
    assert!(!text.contains("Updated editions"));
}
