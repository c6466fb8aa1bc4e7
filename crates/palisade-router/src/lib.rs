//! Prefix-trie HTTP request router.
//!
//! Compiles OpenAPI path templates into a prefix trie with static, param
//! and mixed segments plus method sets. Every template that matches a
//! request path is collected and ranked: more literal segments first, then
//! declaration order.

pub mod trie;

pub use trie::{normalize_path, RouteEntry, RouteMatch, Router};
