//! Category folder derivation.
//!
//! Every written asset lands under `{output}/{Kind}/{category}/`, where the
//! category is a pure function of the classification choice and the asset's
//! attributes. Bands and style names match what earlier releases produced
//! so re-extraction lands files in the same folders.

/// Size bands shared by audio, fonts and images.
const SIZE_BANDS: &[(&str, u64)] = &[
    ("ultra_small_0-50KB", 50 * 1024),
    ("small_50-200KB", 200 * 1024),
    ("medium_200KB-1MB", 1024 * 1024),
    ("large_1MB-5MB", 5 * 1024 * 1024),
];

/// Catch-all size band.
const SIZE_OVERFLOW: &str = "ultra_large_5MB+";

/// Duration bands for audio, in seconds.
const DURATION_BANDS: &[(&str, f64)] = &[
    ("ultra_short_0-5s", 5.0),
    ("short_5-15s", 15.0),
    ("medium_15-60s", 60.0),
    ("long_60-300s", 300.0),
];

/// Catch-all duration band.
const DURATION_OVERFLOW: &str = "ultra_long_300s+";

/// Size band for a payload of `len` bytes.
pub fn size_category(len: u64) -> &'static str {
    for (name, upper) in SIZE_BANDS {
        if len < *upper {
            return name;
        }
    }
    SIZE_OVERFLOW
}

/// Duration band for an audio clip of `seconds` length.
///
/// A failed probe reports 0.0 and lands in the first band.
pub fn duration_category(seconds: f64) -> &'static str {
    for (name, upper) in DURATION_BANDS {
        if seconds < *upper {
            return name;
        }
    }
    DURATION_OVERFLOW
}

/// Fold a family or face name into a filesystem-safe folder name: spaces
/// and hyphens become underscores, everything else non-alphanumeric drops.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Canonical style folder for a face name.
///
/// Specific weights win over generic ones (`Extra Bold` before `Bold`);
/// italic combines with the weight it qualifies; unrecognized styles fall
/// back to the sanitized face name.
pub fn style_category(face_name: &str) -> String {
    let face = face_name.to_lowercase();

    if face.contains("black") {
        return "Black".to_string();
    }
    if face.contains("extra bold") || face.contains("extrabold") {
        return "Extra_Bold".to_string();
    }
    if face.contains("semi bold") || face.contains("semibold") {
        return "Semi_Bold".to_string();
    }
    if face.contains("bold") && !face.contains("italic") {
        return "Bold".to_string();
    }
    if face.contains("extra light") || face.contains("extralight") {
        return "Extra_Light".to_string();
    }
    if face.contains("thin") {
        return "Thin".to_string();
    }
    if face.contains("light") && !face.contains("italic") {
        return "Light".to_string();
    }
    if face.contains("medium") && !face.contains("italic") {
        return "Medium".to_string();
    }
    if face.contains("regular") || face == "normal" {
        return "Regular".to_string();
    }
    if face.contains("italic") {
        if face.contains("bold") {
            return "Bold_Italic".to_string();
        }
        if face.contains("light") {
            return "Light_Italic".to_string();
        }
        if face.contains("medium") {
            return "Medium_Italic".to_string();
        }
        return "Italic".to_string();
    }

    let sanitized = sanitize_name(face_name);
    if sanitized.is_empty() {
        "Other".to_string()
    } else {
        sanitized
    }
}

/// Timestamped output file name: `{base}_{YYYYMMDD_HHMMSS}_{rand4}.{ext}`.
///
/// The 4-char random suffix removes intra-run collisions between workers
/// writing files derived from the same source name.
pub fn output_file_name(base: &str, extension: &str) -> String {
    use rand::Rng;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let suffix: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(4)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("{base}_{timestamp}_{suffix}.{extension}")
}
