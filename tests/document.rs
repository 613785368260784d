//! Whole-document transform over the in-memory element tree
//!
//! Run with: RUST_LOG=pather=trace cargo test --features tracing --test document -- --nocapture

use pather::{DocumentTree, ElementTree, ErrorKind, Options, transform};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn gear() -> ElementTree {
    let mut tree = ElementTree::new("svg");
    let root = tree.root();
    tree.set_attribute(root, "viewBox", "0 0 10u 10u".into());
    let defs = tree.append(root, "defs", &[]);
    tree.append(defs, "unit", &[("id", "u"), ("value", "k/2")]);
    tree.append(defs, "unit", &[("id", "k"), ("value", "3")]);
    tree.append(defs, "segment", &[("id", "tooth"), ("d", "l u,-u l u,u")]);
    tree.append(root, "path", &[("d", "M 0,5u 4tooth"), ("stroke-width", "u/10")]);
    tree.append(root, "rect", &[("x", "u"), ("y", "u"), ("width", "8u"), ("height", "2u")]);
    tree.append(root, "polyline", &[("points", "0,0 u,u 2u,0")]);
    tree
}

#[test]
fn transform_rewrites_the_document() {
    init_tracing();
    let mut tree = gear();
    let context = transform(&mut tree, Options::default()).unwrap();
    assert_eq!(context.unit("u").map(|u| u.format(3)).as_deref(), Some("1.5"));
    insta::assert_snapshot!(tree.to_markup(), @r#"<svg viewBox="0 0 15 15"><defs/><path d="M0,7.5 l1.5,-1.5 l1.5,1.5 l1.5,-1.5 l1.5,1.5 l1.5,-1.5 l1.5,1.5 l1.5,-1.5 l1.5,1.5" stroke-width="0.15"/><rect x="1.5" y="1.5" width="12" height="3"/><polyline points="0 0 1.5 1.5 3 0"/></svg>"#);
}

#[test]
fn combined_commands_at_higher_precision() {
    init_tracing();
    let mut tree = ElementTree::new("svg");
    let root = tree.root();
    tree.append(root, "unit", &[("id", "third"), ("value", "1/3")]);
    tree.append(root, "segment", &[("id", "run"), ("d", "h third")]);
    let path = tree.append(root, "path", &[("d", "m 0 0 3run v third")]);
    let options = Options {
        precision: 5,
        combine_commands: true,
        ..Options::default()
    };
    transform(&mut tree, options).unwrap();
    assert_eq!(tree.attribute(path, "d").as_deref(), Some("m0,0 h1 v0.33333"));
}

#[test]
fn first_error_aborts_the_transform() {
    init_tracing();
    let mut tree = ElementTree::new("svg");
    let root = tree.root();
    tree.append(root, "path", &[("d", "M 0 nope")]);
    let err = transform(&mut tree, Options::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Reference);
    assert_eq!(err.to_string(), "reference to undefined unit \"nope\" at column 4");
}

#[test]
fn overrides_replace_document_units() {
    init_tracing();
    let mut tree = gear();
    let options = Options {
        overrides: vec!["u=1".parse().unwrap()],
        ..Options::default()
    };
    transform(&mut tree, options).unwrap();
    let root = tree.root();
    assert_eq!(tree.attribute(root, "viewBox").as_deref(), Some("0 0 10 10"));
}
