//! Response selection: conditional first-match, sequential round-robin,
//! random, and default/first fallback.
//!
//! Sequential cursors are lock-free atomics keyed by endpoint id, held
//! outside the endpoint snapshot so concurrent requests advance the
//! round-robin without racing and hot-swapped endpoint tables keep their
//! position. Every N consecutive selections over N active responses visit
//! each exactly once.

use crate::engine::context::RequestContext;
use crate::model::{Endpoint, ResponseDef, SelectionMode};
use crate::validation::lookup_json_path;
use parking_lot::{RwLock, RwLockWriteGuard};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free round-robin cursor for one endpoint.
#[derive(Default)]
pub struct EndpointCursor(AtomicU64);

impl EndpointCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Return the index to serve and advance, wrapping modulo `count`.
    /// A cursor past the end (the active set shrank) is clamped first.
    pub fn advance(&self, count: u64) -> u64 {
        if count == 0 {
            return 0;
        }
        let old = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                let current = v.min(count - 1);
                Some((current + 1) % count)
            })
            .unwrap_or_else(|e| {
                debug_assert!(false, "we never return None from fetch_update");
                e
            });
        old.min(count - 1)
    }

    #[must_use]
    pub fn peek(&self, count: u64) -> u64 {
        if count == 0 {
            return 0;
        }
        self.0.load(Ordering::Relaxed).min(count - 1)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

impl fmt::Debug for EndpointCursor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("EndpointCursor")
            .field(&self.0.load(Ordering::Relaxed))
            .finish()
    }
}

/// Sequential-selection state for all endpoints of one serving surface.
///
/// A single lock protects the cursor map; the cursors themselves are
/// atomic, so the common path takes only a read lock.
#[derive(Debug)]
pub struct SelectionCycler {
    state: RwLock<HashMap<String, EndpointCursor>>,
}

impl Default for SelectionCycler {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionCycler {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Advance the cursor for an endpoint and return the index to serve.
    pub fn next_index(&self, endpoint_id: &str, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let mut state = self.state.read();
        // Opportunistically use the read lock; create the cursor under a
        // write lock only on first sight of this endpoint, then downgrade.
        let cursor = if let Some(cursor) = state.get(endpoint_id) {
            cursor
        } else {
            drop(state);
            let mut write = self.state.write();
            write.entry(endpoint_id.to_string()).or_default();
            state = RwLockWriteGuard::downgrade(write);
            state
                .get(endpoint_id)
                .expect("cursor inserted under the write lock we downgraded from")
        };
        cursor.advance(count as u64) as usize
    }

    pub fn reset(&self, endpoint_id: &str) {
        let state = self.state.read();
        if let Some(cursor) = state.get(endpoint_id) {
            cursor.reset();
        }
    }

    pub fn reset_all(&self) {
        self.state.write().clear();
    }
}

/// Pick the response to serve for a matched, validated endpoint.
///
/// Any active response with a matching condition wins regardless of the
/// endpoint's mode; otherwise Sequential/Random apply, and the fallback is
/// the default-flagged response, else the first. An endpoint with no active
/// responses yields a synthesized 200/JSON/`{}` reply rather than an error.
pub fn select_response(
    endpoint: &Endpoint,
    ctx: &RequestContext,
    params: &HashMap<String, String>,
    cycler: &SelectionCycler,
) -> ResponseDef {
    let mut active: Vec<&ResponseDef> = endpoint.responses.iter().filter(|r| r.active).collect();
    active.sort_by_key(|r| r.order);

    if active.is_empty() {
        return ResponseDef::synthesized();
    }

    for response in &active {
        if let Some(condition) = response.condition.as_deref() {
            if !condition.trim().is_empty() && condition_matches(condition, ctx, params) {
                return (*response).clone();
            }
        }
    }

    match endpoint.response_mode {
        SelectionMode::Sequential => {
            let idx = cycler.next_index(&endpoint.id, active.len());
            active[idx.min(active.len() - 1)].clone()
        }
        SelectionMode::Random => {
            let idx = rand::thread_rng().gen_range(0..active.len());
            active[idx].clone()
        }
        SelectionMode::Conditional => default_or_first(&active).clone(),
    }
}

fn default_or_first<'a>(active: &[&'a ResponseDef]) -> &'a ResponseDef {
    active
        .iter()
        .find(|r| r.is_default)
        .copied()
        .unwrap_or(active[0])
}

// ============================================================================
// Condition expressions
// ============================================================================

const OPERATORS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

/// Evaluate a condition expression like `body.user.role == "admin"` or
/// `query.age >= 18` against the current request. Unresolvable operands and
/// unparsable expressions evaluate to false.
pub fn condition_matches(
    condition: &str,
    ctx: &RequestContext,
    params: &HashMap<String, String>,
) -> bool {
    let (lhs, op, rhs) = match split_condition(condition) {
        Some(parts) => parts,
        None => return false,
    };

    let left = match resolve_operand(lhs.trim(), ctx, params) {
        Some(v) => v,
        None => return false,
    };
    let right = unquote(rhs.trim());

    let numeric = left.parse::<f64>().ok().zip(right.parse::<f64>().ok());
    match op {
        "==" => match numeric {
            Some((l, r)) => l == r,
            None => left == right,
        },
        "!=" => match numeric {
            Some((l, r)) => l != r,
            None => left != right,
        },
        ">=" => numeric.map(|(l, r)| l >= r).unwrap_or(false),
        "<=" => numeric.map(|(l, r)| l <= r).unwrap_or(false),
        ">" => numeric.map(|(l, r)| l > r).unwrap_or(false),
        "<" => numeric.map(|(l, r)| l < r).unwrap_or(false),
        _ => false,
    }
}

/// Split on the earliest operator occurrence, longest operator first so
/// `>=` is not read as `>`.
fn split_condition(condition: &str) -> Option<(&str, &'static str, &str)> {
    let mut best: Option<(usize, &'static str)> = None;
    for op in OPERATORS {
        if let Some(idx) = condition.find(op) {
            match best {
                Some((best_idx, _)) if best_idx <= idx => {}
                _ => best = Some((idx, op)),
            }
        }
    }
    let (idx, op) = best?;
    Some((&condition[..idx], op, &condition[idx + op.len()..]))
}

fn resolve_operand(
    operand: &str,
    ctx: &RequestContext,
    params: &HashMap<String, String>,
) -> Option<String> {
    let (domain, rest) = match operand.split_once('.') {
        Some((d, r)) => (d, r),
        None => {
            return match operand {
                "method" => Some(ctx.method.clone()),
                "path" => Some(ctx.path.clone()),
                _ => None,
            }
        }
    };

    match domain {
        "query" => ctx.query.get(rest).cloned(),
        "header" | "headers" => ctx.headers.get(&rest.to_lowercase()).cloned(),
        "cookie" | "cookies" => ctx.cookies.get(rest).cloned(),
        "params" | "path" => params.get(rest).cloned(),
        "body" => {
            let root = ctx.body_json()?.ok()?;
            let value = lookup_json_path(&root, rest)?;
            Some(match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        }
        _ => None,
    }
}

fn unquote(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}
