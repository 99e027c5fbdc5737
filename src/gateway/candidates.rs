/// Path variants tried against the upstream, in order, without duplicates.
///
/// The configured path comes first, then the same path with its trailing slash
/// toggled, then every combination of {no prefix, `/api`} x {hyphen, underscore}
/// x {no trailing slash, trailing slash} built from the configured path's stem.
pub fn candidate_paths(configured: &str) -> Vec<String> {
    let configured = with_leading_slash(configured);
    let mut out: Vec<String> = vec![];
    let mut push = |path: String| {
        if !out.contains(&path) {
            out.push(path);
        }
    };

    push(configured.clone());
    push(toggle_trailing_slash(&configured));

    let stem = stem(&configured);
    if stem.is_empty() {
        return out;
    }
    for prefix in ["", "/api"] {
        for spelling in [stem.replace('_', "-"), stem.replace('-', "_")] {
            push(format!("{prefix}{spelling}"));
            push(format!("{prefix}{spelling}/"));
        }
    }
    out
}

/// Joins a base URL and a path with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), with_leading_slash(path))
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn toggle_trailing_slash(path: &str) -> String {
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        Some(_) => path.to_string(),
        None => format!("{path}/"),
    }
}

// "/api/video-count-population/" -> "/video-count-population"
fn stem(path: &str) -> String {
    let path = path.trim_end_matches('/');
    let path = match path.strip_prefix("/api") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    };
    path.to_string()
}
