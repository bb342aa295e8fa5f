//! Path addressing over configuration and schema trees.
//!
//! A path is a sequence of `/`-separated segments: plain names,
//! `name[key]` compound lookups, the contextual `[@item]` placeholder,
//! the `@` reference marker and the `*` wildcard.

pub mod resolver;
pub mod segment;

pub use resolver::{
    evaluate_xpath, expand_wildcard, list_member_key, node_path, resolve_reference, select,
    select_from,
};
pub use segment::{render, tokenize, Segment};
