const URL_PREFIXES: [&str; 4] = ["http://", "https://", "git@", "ssh://"];
const URL_MARKERS: [&str; 4] = [".git", "github.com", "gitlab.com", "bitbucket.org"];

/// Case-insensitive key for pack ids and directory names.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

pub fn is_url_like(input: &str) -> bool {
    let lower = input.trim().to_ascii_lowercase();
    URL_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
        || URL_MARKERS.iter().any(|marker| lower.contains(marker))
}

pub fn is_commit_hash(input: &str) -> bool {
    input.len() == 40 && input.chars().all(|ch| ch.is_ascii_hexdigit())
}

/// Reduces a repository URL to `owner/repo`. Inputs that carry no
/// path segments come back trimmed.
pub fn compact_url(url: &str) -> String {
    let trimmed = strip_repo_suffixes(url);
    let path = repository_path(trimmed);
    let segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    match segments.as_slice() {
        [.., owner, repo] => format!("{owner}/{repo}"),
        _ => trimmed.to_string(),
    }
}

/// Canonical clone URL. Bare `owner/repo` ids are taken to live on GitHub.
pub fn normalize_git_url(url: &str) -> String {
    let trimmed = strip_repo_suffixes(url);
    if trimmed.contains("://") {
        return trimmed.to_string();
    }
    if let Some((user_host, path)) = trimmed.split_once(':') {
        if let Some((_, host)) = user_host.split_once('@') {
            return format!("https://{host}/{path}");
        }
    }
    if trimmed.matches('/').count() == 1 && !trimmed.starts_with('/') {
        return format!("https://github.com/{trimmed}");
    }
    trimmed.to_string()
}

/// Last path segment of a repository URL or compact id.
pub fn repository_name(url: &str) -> String {
    let compact = compact_url(url);
    compact
        .rsplit('/')
        .next()
        .unwrap_or(compact.as_str())
        .to_string()
}

/// Splits `name@spec`. URL-like requests are returned whole.
pub fn split_pack_request(input: &str) -> (String, Option<String>) {
    let trimmed = input.trim();
    if is_url_like(trimmed) {
        return (trimmed.to_string(), None);
    }
    match trimmed.rsplit_once('@') {
        Some((name, spec)) if !spec.trim().is_empty() => {
            (name.trim().to_string(), Some(spec.trim().to_string()))
        }
        _ => (trimmed.trim_end_matches('@').to_string(), None),
    }
}

fn strip_repo_suffixes(url: &str) -> &str {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed.strip_suffix(".git").unwrap_or(trimmed)
}

fn repository_path(url: &str) -> &str {
    if let Some((_, rest)) = url.split_once("://") {
        return rest.split_once('/').map(|(_, path)| path).unwrap_or("");
    }
    if let Some((user_host, path)) = url.split_once(':') {
        if user_host.contains('@') {
            return path;
        }
    }
    url
}
