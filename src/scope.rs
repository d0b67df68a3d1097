//! Scope-overlap predicate (spec.md §4.3).
//!
//! Two phases' declared file scopes "overlap" when some path could satisfy
//! patterns from both sides. This is necessarily a heuristic: some pattern
//! pairs (`?`, `[...]`) are treated conservatively as overlapping rather
//! than precisely resolved, since a general two-glob intersection test is
//! undecidable in the general case. The documented behaviors below are
//! pinned by tests so future changes to the heuristic are intentional.

use glob::Pattern;

fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

fn has_conservative_chars(p: &str) -> bool {
    p.contains('?') || p.contains('[')
}

fn is_literal(p: &str) -> bool {
    !p.contains('*') && !has_conservative_chars(p)
}

/// Directory prefix of a `**`-bearing pattern, i.e. everything before the
/// first path component containing `**`.
fn double_star_prefix(p: &str) -> Option<String> {
    if !p.contains("**") {
        return None;
    }
    let components: Vec<&str> = p.split('/').collect();
    let mut prefix = Vec::new();
    for c in components {
        if c.contains("**") {
            break;
        }
        prefix.push(c);
    }
    Some(prefix.join("/"))
}

fn dir_of(p: &str) -> &str {
    match p.rfind('/') {
        Some(idx) => &p[..idx],
        None => "",
    }
}

fn is_single_star_pattern(p: &str) -> bool {
    p.contains('*') && !p.contains("**")
}

/// Replace every `*` in `p` with the literal `x`, producing a
/// representative concrete path.
fn representative(p: &str) -> String {
    p.replace('*', "x")
}

/// True if `pa` and `pb` describe overlapping sets of paths.
pub fn patterns_overlap(pa: &str, pb: &str) -> bool {
    let pa = clean(pa);
    let pb = clean(pb);

    if pa == pb {
        return true;
    }

    if has_conservative_chars(&pa) || has_conservative_chars(&pb) {
        return true;
    }

    // Directory containment: one is a path-prefix of the other (treating
    // each as a directory, not just a string prefix).
    if is_literal(&pa) || is_literal(&pb) {
        if dir_contains(&pa, &pb) || dir_contains(&pb, &pa) {
            return true;
        }
    }

    if let (Some(pre_a), _) = (double_star_prefix(&pa), ()) {
        let pre_b = double_star_prefix(&pb).unwrap_or_else(|| dir_of(&pb).to_string());
        return dir_contains(&pre_a, &pre_b) || dir_contains(&pre_b, &pre_a) || pre_a == pre_b;
    }
    if let (Some(pre_b), _) = (double_star_prefix(&pb), ()) {
        let pre_a = double_star_prefix(&pa).unwrap_or_else(|| dir_of(&pa).to_string());
        return dir_contains(&pre_a, &pre_b) || dir_contains(&pre_b, &pre_a) || pre_a == pre_b;
    }

    // Same-directory single-`*` globs: `internal/*.go` vs `internal/*.ts`
    // do not overlap, but `internal/*` and `internal/*.go` do. Resolved by
    // building a representative path from one pattern (`*` -> `x`) and
    // testing it against the other pattern.
    if is_single_star_pattern(&pa) && is_single_star_pattern(&pb) {
        let rep_a = representative(&pa);
        let rep_b = representative(&pb);
        let match_a_vs_b = Pattern::new(&pb).map(|g| g.matches(&rep_a)).unwrap_or(false);
        let match_b_vs_a = Pattern::new(&pa).map(|g| g.matches(&rep_b)).unwrap_or(false);
        return match_a_vs_b || match_b_vs_a;
    }

    // Glob-vs-literal: standard glob matching.
    if is_literal(&pa) {
        return Pattern::new(&pb).map(|g| g.matches(&pa)).unwrap_or(false);
    }
    if is_literal(&pb) {
        return Pattern::new(&pa).map(|g| g.matches(&pb)).unwrap_or(false);
    }

    // Fallback: one glob matching the other's literalized representative.
    let rep_a = representative(&pa);
    let rep_b = representative(&pb);
    Pattern::new(&pb).map(|g| g.matches(&rep_a)).unwrap_or(false)
        || Pattern::new(&pa).map(|g| g.matches(&rep_b)).unwrap_or(false)
}

/// True if directory `maybe_parent` contains `maybe_child` (or they're
/// equal), treating both as `/`-separated directory paths.
fn dir_contains(maybe_parent: &str, maybe_child: &str) -> bool {
    if maybe_parent.is_empty() {
        return true;
    }
    maybe_child == maybe_parent || maybe_child.starts_with(&format!("{maybe_parent}/"))
}

/// True if any pattern in `sa` overlaps any pattern in `sb`.
pub fn scopes_overlap(sa: &[String], sb: &[String]) -> bool {
    sa.iter().any(|a| sb.iter().any(|b| patterns_overlap(a, b)))
}
