use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

/// The routing trie. Maps HTTP paths + methods to route matches.
#[derive(Debug, Default)]
pub struct Router {
    root: Node,
    /// Number of distinct templates inserted so far.
    templates: usize,
}

/// A single node in the prefix trie.
#[derive(Debug, Default)]
struct Node {
    /// Static children keyed by segment name.
    static_children: HashMap<String, Node>,
    /// Placeholder children (`{id}` or mixed like `{name}.{ext}`), in
    /// insertion order. Distinct placeholder names get distinct children so
    /// `/a/{x}` and `/a/{y}` stay separate templates.
    param_children: Vec<ParamNode>,
    /// Set when a template ends at this node.
    terminal: Option<Terminal>,
}

/// A placeholder segment node.
#[derive(Debug)]
struct ParamNode {
    segment: Segment,
    /// The subtree below this segment.
    node: Node,
}

/// A template ending at a node, with its method map.
#[derive(Debug)]
struct Terminal {
    /// Declaration order of the template.
    order: usize,
    /// Number of fully literal segments in the template.
    literals: usize,
    /// Method-to-route mapping, keys uppercase.
    methods: HashMap<String, RouteEntry>,
}

/// A matched route entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Index into the caller's operation list.
    pub operation_index: usize,
}

/// The result of a route lookup.
#[derive(Debug, PartialEq, Eq)]
pub enum RouteMatch {
    /// Matched a path and method.
    Found {
        entry: RouteEntry,
        params: Vec<(String, String)>,
    },
    /// At least one template matched the path, none declares the method.
    MethodNotAllowed { allowed: Vec<String> },
    /// No template matched the path.
    NotFound,
}

/// A parsed path template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    /// A whole-segment placeholder (`{id}`).
    Param(String),
    /// Literal text and placeholders sharing one segment (`{name}.{ext}`).
    Mixed(Vec<Part>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Capture(String),
}

/// A terminal reached by the request path, with its captures.
struct Candidate<'a> {
    terminal: &'a Terminal,
    params: Vec<(String, String)>,
}

impl Router {
    /// Create a new empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route into the trie.
    ///
    /// Path should be a template like "/users/{id}/orders". Templates are
    /// ranked by the order in which they are first inserted. The method is
    /// stored uppercase.
    pub fn insert(&mut self, path: &str, method: &str, entry: RouteEntry) {
        let segments = parse_path_template(path);
        let literals = segments
            .iter()
            .filter(|s| matches!(s, Segment::Static(_)))
            .count();

        let order = self.templates;
        let node = Self::traverse_or_create(&mut self.root, &segments);
        let terminal = node.terminal.get_or_insert_with(|| Terminal {
            order,
            literals,
            methods: HashMap::new(),
        });
        if terminal.order == order {
            self.templates += 1;
        }

        // The first declaration of a method on a template wins
        terminal
            .methods
            .entry(method.to_ascii_uppercase())
            .or_insert(entry);
    }

    /// Number of distinct templates in the trie.
    pub fn template_count(&self) -> usize {
        self.templates
    }

    /// Look up a request path and method.
    ///
    /// Path should be an actual request path (not a template). Captured
    /// values are returned raw; decoding is left to the caller. Method
    /// comparison ignores case.
    pub fn lookup(&self, path: &str, method: &str) -> RouteMatch {
        let normalized = normalize_path(path);
        let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();

        let mut candidates = Vec::new();
        let mut params = Vec::new();
        Self::collect_matches(&self.root, &segments, &mut params, &mut candidates);

        if candidates.is_empty() {
            return RouteMatch::NotFound;
        }

        candidates.sort_by_key(|c| (Reverse(c.terminal.literals), c.terminal.order));

        let method = method.to_ascii_uppercase();
        if let Some(idx) = candidates
            .iter()
            .position(|c| c.terminal.methods.contains_key(&method))
        {
            let candidate = candidates.swap_remove(idx);
            if let Some(entry) = candidate.terminal.methods.get(&method) {
                return RouteMatch::Found {
                    entry: entry.clone(),
                    params: candidate.params,
                };
            }
        }

        let allowed: BTreeSet<&String> = candidates
            .iter()
            .flat_map(|c| c.terminal.methods.keys())
            .collect();
        RouteMatch::MethodNotAllowed {
            allowed: allowed.into_iter().cloned().collect(),
        }
    }

    /// Traverse or create nodes for a path template.
    fn traverse_or_create<'n>(root: &'n mut Node, segments: &[Segment]) -> &'n mut Node {
        let mut current = root;

        for segment in segments {
            current = match segment {
                Segment::Static(name) => current.static_children.entry(name.clone()).or_default(),
                placeholder => {
                    let idx = match current
                        .param_children
                        .iter()
                        .position(|p| &p.segment == placeholder)
                    {
                        Some(idx) => idx,
                        None => {
                            current.param_children.push(ParamNode {
                                segment: placeholder.clone(),
                                node: Node::default(),
                            });
                            current.param_children.len() - 1
                        }
                    };
                    &mut current.param_children[idx].node
                }
            };
        }

        current
    }

    /// Walk every branch that matches the request segments and record each
    /// terminal reached, with the parameters captured along the way.
    fn collect_matches<'a>(
        node: &'a Node,
        segments: &[&str],
        params: &mut Vec<(String, String)>,
        out: &mut Vec<Candidate<'a>>,
    ) {
        let Some((segment, remaining)) = segments.split_first() else {
            if let Some(terminal) = &node.terminal {
                out.push(Candidate {
                    terminal,
                    params: params.clone(),
                });
            }
            return;
        };

        if let Some(child) = node.static_children.get(*segment) {
            Self::collect_matches(child, remaining, params, out);
        }

        for child in &node.param_children {
            let param_len = params.len();
            let matched = match &child.segment {
                Segment::Param(name) => {
                    params.push((name.clone(), segment.to_string()));
                    true
                }
                Segment::Mixed(parts) => match_parts(parts, segment, params),
                Segment::Static(_) => false,
            };

            if matched {
                Self::collect_matches(&child.node, remaining, params, out);
            }

            // Backtrack for the next sibling.
            params.truncate(param_len);
        }
    }
}

/// Match one request segment against a mixed template segment.
///
/// Captures are non-empty and as short as possible, so `{name}.{ext}`
/// splits `archive.tar.gz` into `archive` and `tar.gz`.
fn match_parts(parts: &[Part], input: &str, params: &mut Vec<(String, String)>) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return input.is_empty();
    };

    match first {
        Part::Literal(literal) => match input.strip_prefix(literal.as_str()) {
            Some(tail) => match_parts(rest, tail, params),
            None => false,
        },
        Part::Capture(name) => {
            for end in (1..=input.len()).filter(|&i| input.is_char_boundary(i)) {
                let param_len = params.len();
                params.push((name.clone(), input[..end].to_string()));
                if match_parts(rest, &input[end..], params) {
                    return true;
                }
                params.truncate(param_len);
            }
            false
        }
    }
}

/// Parse a path template into segments.
fn parse_path_template(path: &str) -> Vec<Segment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if !s.contains('{') {
                return Segment::Static(s.to_string());
            }
            let parts = parse_parts(s);
            match parts.as_slice() {
                [Part::Capture(name)] => Segment::Param(name.clone()),
                _ => Segment::Mixed(parts),
            }
        })
        .collect()
}

fn parse_parts(segment: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut rest = segment;

    while !rest.is_empty() {
        match rest.find('{') {
            Some(0) => match rest.find('}') {
                Some(close) => {
                    parts.push(Part::Capture(rest[1..close].to_string()));
                    rest = &rest[close + 1..];
                }
                // Unclosed brace is literal text
                None => {
                    parts.push(Part::Literal(rest.to_string()));
                    rest = "";
                }
            },
            Some(open) => {
                parts.push(Part::Literal(rest[..open].to_string()));
                rest = &rest[open..];
            }
            None => {
                parts.push(Part::Literal(rest.to_string()));
                rest = "";
            }
        }
    }

    parts
}

/// Normalize a request path: strip trailing slashes, collapse double slashes.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut prev_slash = false;

    for ch in path.chars() {
        if ch == '/' {
            if !prev_slash {
                normalized.push('/');
            }
            prev_slash = true;
        } else {
            normalized.push(ch);
            prev_slash = false;
        }
    }

    // Strip trailing slash (but keep root "/")
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }

    if normalized.is_empty() {
        "/".to_string()
    } else {
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(operation_index: usize) -> RouteEntry {
        RouteEntry { operation_index }
    }

    fn found(router: &Router, path: &str, method: &str) -> (usize, Vec<(String, String)>) {
        match router.lookup(path, method) {
            RouteMatch::Found { entry, params } => (entry.operation_index, params),
            other => panic!("expected Found for {method} {path}, got {other:?}"),
        }
    }

    fn param(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    // === Normalization tests ===

    #[test]
    fn normalize_strips_trailing_slash() {
        assert_eq!(normalize_path("/notes/"), "/notes");
    }

    #[test]
    fn normalize_collapses_double_slashes() {
        assert_eq!(normalize_path("/notes//abc"), "/notes/abc");
    }

    #[test]
    fn normalize_preserves_root() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }

    // === Routing tests ===

    #[test]
    fn route_static_path() {
        let mut router = Router::new();
        router.insert("/login", "POST", entry(0));

        let (index, params) = found(&router, "/login", "POST");
        assert_eq!(index, 0);
        assert!(params.is_empty());
    }

    #[test]
    fn route_with_parameter() {
        let mut router = Router::new();
        router.insert("/notes/{identifier}", "GET", entry(0));

        let (_, params) = found(&router, "/notes/abc", "GET");
        assert_eq!(params, vec![param("identifier", "abc")]);
    }

    #[test]
    fn route_with_multiple_parameters() {
        let mut router = Router::new();
        router.insert("/users/{userId}/orders/{orderId}", "GET", entry(0));

        let (_, params) = found(&router, "/users/42/orders/99", "GET");
        assert_eq!(params, vec![param("userId", "42"), param("orderId", "99")]);
    }

    #[test]
    fn route_root_path() {
        let mut router = Router::new();
        router.insert("/", "GET", entry(0));
        assert_eq!(found(&router, "/", "GET").0, 0);
        assert_eq!(router.lookup("/other", "GET"), RouteMatch::NotFound);
    }

    #[test]
    fn route_normalizes_request_path() {
        let mut router = Router::new();
        router.insert("/notes/{identifier}", "GET", entry(0));
        assert_eq!(found(&router, "//notes//abc/", "GET").1, vec![param("identifier", "abc")]);
    }

    #[test]
    fn route_not_found() {
        let mut router = Router::new();
        router.insert("/notes/{identifier}", "GET", entry(0));

        assert_eq!(router.lookup("/notes", "GET"), RouteMatch::NotFound);
        assert_eq!(router.lookup("/notes/abc/extra", "GET"), RouteMatch::NotFound);
        assert_eq!(router.lookup("/posts/abc", "GET"), RouteMatch::NotFound);
    }

    #[test]
    fn route_method_not_allowed() {
        let mut router = Router::new();
        router.insert("/notes/{identifier}", "GET", entry(0));
        router.insert("/notes/{identifier}", "DELETE", entry(1));

        assert_eq!(
            router.lookup("/notes/abc", "PUT"),
            RouteMatch::MethodNotAllowed {
                allowed: vec!["DELETE".to_string(), "GET".to_string()]
            }
        );
    }

    #[test]
    fn method_is_case_insensitive() {
        let mut router = Router::new();
        router.insert("/login", "post", entry(0));
        assert_eq!(found(&router, "/login", "POST").0, 0);
        assert_eq!(found(&router, "/login", "Post").0, 0);
    }

    #[test]
    fn static_takes_precedence_over_param() {
        let mut router = Router::new();
        router.insert("/users/{id}", "GET", entry(0));
        router.insert("/users/me", "GET", entry(1));

        assert_eq!(found(&router, "/users/me", "GET"), (1, vec![]));
        assert_eq!(found(&router, "/users/123", "GET"), (0, vec![param("id", "123")]));
    }

    #[test]
    fn more_literal_segments_win() {
        let mut router = Router::new();
        router.insert("/{a}/{b}/c", "GET", entry(0));
        router.insert("/x/{b}/c", "GET", entry(1));
        router.insert("/x/y/{c}", "GET", entry(2));

        // `/x/y/{c}` and `/x/{b}/c` both have two literals; the earlier wins
        assert_eq!(found(&router, "/x/y/c", "GET").0, 1);
        assert_eq!(found(&router, "/z/y/c", "GET").0, 0);
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let mut router = Router::new();
        router.insert("/files/{name}", "GET", entry(0));
        router.insert("/files/{id}", "GET", entry(1));

        assert_eq!(found(&router, "/files/readme", "GET"), (0, vec![param("name", "readme")]));
    }

    #[test]
    fn ranked_template_without_method_falls_through() {
        let mut router = Router::new();
        router.insert("/users/{id}", "GET", entry(0));
        router.insert("/users/me", "POST", entry(1));

        assert_eq!(found(&router, "/users/me", "GET"), (0, vec![param("id", "me")]));
        assert_eq!(found(&router, "/users/me", "POST").0, 1);
    }

    #[test]
    fn method_not_allowed_lists_union_of_matching_templates() {
        let mut router = Router::new();
        router.insert("/users/{id}", "GET", entry(0));
        router.insert("/users/me", "POST", entry(1));
        router.insert("/users/me", "PATCH", entry(2));

        assert_eq!(
            router.lookup("/users/me", "DELETE"),
            RouteMatch::MethodNotAllowed {
                allowed: vec!["GET".into(), "PATCH".into(), "POST".into()]
            }
        );
        // Only the param template matches here
        assert_eq!(
            router.lookup("/users/42", "DELETE"),
            RouteMatch::MethodNotAllowed {
                allowed: vec!["GET".into()]
            }
        );
    }

    #[test]
    fn mixed_segments_capture_each_placeholder() {
        let mut router = Router::new();
        router.insert("/files/{name}.{ext}", "GET", entry(0));

        assert_eq!(
            found(&router, "/files/report.pdf", "GET").1,
            vec![param("name", "report"), param("ext", "pdf")]
        );
        assert_eq!(
            found(&router, "/files/archive.tar.gz", "GET").1,
            vec![param("name", "archive"), param("ext", "tar.gz")]
        );
        assert_eq!(router.lookup("/files/noext", "GET"), RouteMatch::NotFound);
        assert_eq!(router.lookup("/files/.pdf", "GET"), RouteMatch::NotFound);
    }

    #[test]
    fn mixed_segment_with_literal_prefix() {
        let mut router = Router::new();
        router.insert("/reports/report-{year}", "GET", entry(0));
        router.insert("/reports/{any}", "GET", entry(1));

        // Both match with one literal segment; declaration order wins
        assert_eq!(
            found(&router, "/reports/report-2024", "GET"),
            (0, vec![param("year", "2024")])
        );
        assert_eq!(found(&router, "/reports/summary", "GET").0, 1);
    }

    #[test]
    fn captures_are_returned_raw() {
        let mut router = Router::new();
        router.insert("/notes/{identifier}", "GET", entry(0));
        assert_eq!(
            found(&router, "/notes/a%20b", "GET").1,
            vec![param("identifier", "a%20b")]
        );
    }

    #[test]
    fn duplicate_method_keeps_first_entry() {
        let mut router = Router::new();
        router.insert("/login", "POST", entry(0));
        router.insert("/login/", "POST", entry(1));

        assert_eq!(router.template_count(), 1);
        assert_eq!(found(&router, "/login", "POST").0, 0);
    }

    #[test]
    fn template_count_tracks_distinct_templates() {
        let mut router = Router::new();
        router.insert("/a", "GET", entry(0));
        router.insert("/a", "POST", entry(1));
        router.insert("/b/{id}", "GET", entry(2));
        assert_eq!(router.template_count(), 2);
    }
}
