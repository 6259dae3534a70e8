use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Filename-safe slug for a page URL
///
/// Hostname (lowercased, dots to dashes) joined with the path (slashes to
/// dashes, `home` for the root). Unparseable input has every
/// non-alphanumeric character replaced by a dash.
pub fn url_slug(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.host_str().is_some() => {
            let host = parsed
                .host_str()
                .unwrap_or_default()
                .to_lowercase()
                .replace('.', "-");
            let path = parsed.path().trim_matches('/').replace('/', "-");
            let path = if path.is_empty() { "home".to_string() } else { path };
            format!("{host}-{path}")
        }
        _ => url
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect(),
    }
}

/// Lowercased device name with each run of other characters collapsed to one dash
pub fn device_slug(device: &str) -> String {
    let mut slug = String::with_capacity(device.len());
    for c in device.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// `{url-slug}.{device-slug}.png`, or `...part{i}of{n}.png` for one band of a split capture
pub fn artifact_filename(url: &str, device: &str, part: Option<(u32, u32)>) -> String {
    let base = format!("{}.{}", url_slug(url), device_slug(device));
    match part {
        Some((index, count)) => format!("{base}.part{index}of{count}.png"),
        None => format!("{base}.png"),
    }
}

/// Per-run output folder named after the local start time
pub fn run_directory(root: &Path, started: chrono::DateTime<chrono::Local>) -> PathBuf {
    root.join(started.format("%Y-%m-%d_%H-%M-%S").to_string())
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

pub fn validate_url(url: &str) -> Result<Url, url::ParseError> {
    let parsed = Url::parse(url)?;

    // Ensure it's HTTP or HTTPS
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(url::ParseError::InvalidPort),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_url_slug() {
        assert_eq!(url_slug("https://example.com/"), "example-com-home");
        assert_eq!(url_slug("https://example.com"), "example-com-home");
        assert_eq!(url_slug("https://example.com/blog/post"), "example-com-blog-post");
        assert_eq!(url_slug("https://app.site.com/login"), "app-site-com-login");
        assert_eq!(url_slug("https://Example.COM/docs/"), "example-com-docs");
    }

    #[test]
    fn test_url_slug_fallback() {
        assert_eq!(url_slug("not a url"), "not-a-url");
        assert_eq!(url_slug("a.b/c"), "a-b-c");
    }

    #[test]
    fn test_device_slug() {
        assert_eq!(device_slug("desktop"), "desktop");
        assert_eq!(device_slug("iPhone 12"), "iphone-12");
        assert_eq!(device_slug("Galaxy S9+"), "galaxy-s9");
    }

    #[test]
    fn test_artifact_filename() {
        assert_eq!(
            artifact_filename("https://example.com/", "desktop", None),
            "example-com-home.desktop.png"
        );
        assert_eq!(
            artifact_filename("https://example.com/blog", "iPhone 12", Some((2, 3))),
            "example-com-blog.iphone-12.part2of3.png"
        );
    }

    #[test]
    fn test_run_directory() {
        let started = chrono::Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            run_directory(Path::new("screenshots"), started),
            PathBuf::from("screenshots/2024-03-09_14-05-07")
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 1m 5s");
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("invalid-url").is_err());
    }
}
