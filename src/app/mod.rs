//! Built-in Map/Reduce applications, selectable by name on the worker
//! command line.

use crate::{MapFn, ReduceFn};

pub mod tfidf;
pub mod wc;

pub fn lookup(name: &str) -> Option<(MapFn, ReduceFn)> {
    match name {
        "wc" => Some((wc::map, wc::reduce)),
        "tfidf" => Some((tfidf::map, tfidf::reduce)),
        _ => None,
    }
}
