//! Supported OS families and desktop environments.
//!
//! Keys are the lowercase fragments used in image tags (`arch`, `kde`).
//! Display labels follow one rule everywhere: an OS family uses its entry in
//! [`OS_OPTIONS`], and a desktop key of three characters or fewer renders
//! upper-cased (`i3` → `I3`, `kde` → `KDE`) while longer keys render
//! title-cased (`xfce` → `Xfce`).

/// OS family → desktop keys it ships, in menu order.
pub const OS_DESKTOPS: &[(&str, &[&str])] = &[
    ("alpine", &["i3", "kde", "mate", "xfce"]),
    ("arch", &["i3", "kde", "mate", "xfce"]),
    ("debian", &["i3", "kde", "mate", "xfce"]),
    ("el", &["i3", "mate", "xfce"]),
    ("fedora", &["i3", "kde", "mate", "xfce"]),
    ("ubuntu", &["i3", "kde", "mate", "xfce"]),
];

/// (display label, key) pairs for OS families.
pub const OS_OPTIONS: &[(&str, &str)] = &[
    ("Alpine", "alpine"),
    ("Arch", "arch"),
    ("Debian", "debian"),
    ("Enterprise Linux", "el"),
    ("Fedora", "fedora"),
    ("Ubuntu", "ubuntu"),
];

/// Desktop keys available for `os_family`, or `None` for an unknown family.
pub fn desktops_for(os_family: &str) -> Option<&'static [&'static str]> {
    OS_DESKTOPS
        .iter()
        .find(|(os, _)| *os == os_family)
        .map(|(_, desktops)| *desktops)
}

/// Whether the catalog lists `desktop` for `os_family`.
pub fn is_supported(os_family: &str, desktop: &str) -> bool {
    desktops_for(os_family).is_some_and(|desktops| desktops.contains(&desktop))
}

pub fn desktop_label(key: &str) -> String {
    if key.chars().count() <= 3 {
        key.to_uppercase()
    } else {
        title_case(key)
    }
}

pub fn os_label(key: &str) -> String {
    OS_OPTIONS
        .iter()
        .find(|(_, k)| *k == key)
        .map(|(label, _)| label.to_string())
        .unwrap_or_else(|| title_case(key))
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
