use rand::{distr::Alphanumeric, Rng};

const SUFFIX_LEN: usize = 4;

/// Human-friendly slug from a customer's name: "Sarah Miller" -> "sarah-m-4f2a".
pub fn generate_slug(full_name: &str) -> String {
    let suffix = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();

    slug_with_suffix(full_name, &suffix)
}

fn slug_with_suffix(full_name: &str, suffix: &str) -> String {
    let parts: Vec<String> = full_name
        .split_whitespace()
        .map(|part| {
            part.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|part| !part.is_empty())
        .collect();

    let first = parts.first().cloned().unwrap_or_else(|| "customer".to_string());
    let last_initial = if parts.len() > 1 {
        parts.last().and_then(|last| last.chars().next())
    } else {
        None
    };

    match last_initial {
        Some(initial) => format!("{}-{}-{}", first, initial, suffix),
        None => format!("{}-{}", first, suffix),
    }
}

pub fn build_referral_link(site_url: &str, page_slug: &str, slug: &str) -> String {
    format!("{}/{}?r={}", site_url.trim_end_matches('/'), page_slug, slug)
}
