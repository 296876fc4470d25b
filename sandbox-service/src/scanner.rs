//! Static content scanning of extracted game bundles.
//!
//! Pattern analysis only: fixed regex rulesets over text-like files, known
//! library fingerprinting, and a suspicious-URL denylist. The scan is a
//! pure function of file contents — no network I/O, deterministic for
//! identical inputs — so deployment gating is reproducible.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::models::{Finding, FindingSeverity, ScanReport, ThreatLevel};

/// File extensions eligible for pattern scanning. Everything else is
/// skipped without penalty.
const SCANNABLE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "html", "htm", "css", "svg", "json", "xml", "txt", "md",
];

/// Known third-party library fingerprints, matched as case-insensitive
/// substrings.
const KNOWN_LIBRARIES: &[&str] = &[
    "jquery",
    "react",
    "angular",
    "vue",
    "lodash",
    "underscore",
    "three.js",
    "phaser",
    "pixi",
    "babylon",
    "matter.js",
    "howler",
    "socket.io",
    "axios",
    "moment",
    "d3",
];

/// TLDs disproportionately used for throwaway hosting.
const SUSPICIOUS_TLDS: &[&str] = &[
    ".tk", ".ml", ".ga", ".cf", ".gq", ".top", ".xyz", ".club", ".click",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Injection,
    StorageAccess,
    NetworkApi,
    Obfuscation,
    PrivilegeEscalation,
    ExternalResource,
}

struct ContentRule {
    name: &'static str,
    category: RuleCategory,
    severity: FindingSeverity,
    description: &'static str,
    pattern: Regex,
}

impl ContentRule {
    fn new(
        name: &'static str,
        category: RuleCategory,
        severity: FindingSeverity,
        description: &'static str,
        pattern: &str,
    ) -> Self {
        Self {
            name,
            category,
            severity,
            description,
            pattern: Regex::new(pattern).expect("invalid content rule pattern"),
        }
    }
}

lazy_static! {
    static ref CONTENT_RULES: Vec<ContentRule> = vec![
        // Injection primitives
        ContentRule::new(
            "Dynamic Code Evaluation",
            RuleCategory::Injection,
            FindingSeverity::High,
            "runtime evaluation of arbitrary code",
            r"\beval\s*\(",
        ),
        ContentRule::new(
            "Function Constructor",
            RuleCategory::Injection,
            FindingSeverity::High,
            "code construction via the Function constructor",
            r"\bFunction\s*\(",
        ),
        ContentRule::new(
            "Direct HTML Injection",
            RuleCategory::Injection,
            FindingSeverity::High,
            "assignment to innerHTML",
            r"\binnerHTML\s*=",
        ),
        ContentRule::new(
            "Document Write",
            RuleCategory::Injection,
            FindingSeverity::High,
            "direct document.write call",
            r"document\.write\s*\(",
        ),
        ContentRule::new(
            "Document Domain Relaxation",
            RuleCategory::Injection,
            FindingSeverity::Critical,
            "assignment to document.domain weakens the origin boundary",
            r"document\.domain\s*=",
        ),
        // XSS-adjacent storage and cookie access
        ContentRule::new(
            "Local Storage Access",
            RuleCategory::StorageAccess,
            FindingSeverity::Medium,
            "access to persistent localStorage",
            r"\blocalStorage\b",
        ),
        ContentRule::new(
            "Session Storage Access",
            RuleCategory::StorageAccess,
            FindingSeverity::Medium,
            "access to sessionStorage",
            r"\bsessionStorage\b",
        ),
        ContentRule::new(
            "Cookie Access",
            RuleCategory::StorageAccess,
            FindingSeverity::Medium,
            "access to document.cookie",
            r"document\.cookie",
        ),
        ContentRule::new(
            "IndexedDB Access",
            RuleCategory::StorageAccess,
            FindingSeverity::Medium,
            "access to indexedDB storage",
            r"\bindexedDB\b",
        ),
        // Network APIs
        ContentRule::new(
            "Fetch API",
            RuleCategory::NetworkApi,
            FindingSeverity::Medium,
            "outbound request via fetch",
            r"\bfetch\s*\(",
        ),
        ContentRule::new(
            "XMLHttpRequest",
            RuleCategory::NetworkApi,
            FindingSeverity::Medium,
            "outbound request via XMLHttpRequest",
            r"\bXMLHttpRequest\b",
        ),
        ContentRule::new(
            "WebSocket Connection",
            RuleCategory::NetworkApi,
            FindingSeverity::Medium,
            "persistent WebSocket connection",
            r"\bWebSocket\s*\(",
        ),
        ContentRule::new(
            "Beacon API",
            RuleCategory::NetworkApi,
            FindingSeverity::Medium,
            "background data transmission via sendBeacon",
            r"\bsendBeacon\s*\(",
        ),
        // Obfuscation primitives
        ContentRule::new(
            "Base64 Decode",
            RuleCategory::Obfuscation,
            FindingSeverity::Medium,
            "base64 decoding via atob",
            r"\batob\s*\(",
        ),
        ContentRule::new(
            "Base64 Encode",
            RuleCategory::Obfuscation,
            FindingSeverity::Medium,
            "base64 encoding via btoa",
            r"\bbtoa\s*\(",
        ),
        ContentRule::new(
            "Char Code Construction",
            RuleCategory::Obfuscation,
            FindingSeverity::Medium,
            "string construction from character codes",
            r"String\.fromCharCode",
        ),
        ContentRule::new(
            "Legacy Unescape",
            RuleCategory::Obfuscation,
            FindingSeverity::Medium,
            "legacy unescape decoding",
            r"\bunescape\s*\(",
        ),
        ContentRule::new(
            "URI Component Decode",
            RuleCategory::Obfuscation,
            FindingSeverity::Medium,
            "decodeURIComponent decoding",
            r"\bdecodeURIComponent\s*\(",
        ),
        ContentRule::new(
            "Hex Escape Sequence",
            RuleCategory::Obfuscation,
            FindingSeverity::Medium,
            "hex escape sequences in source text",
            r"\\x[0-9a-fA-F]{2}",
        ),
        // Privilege-escalation window references
        ContentRule::new(
            "Parent Window Reference",
            RuleCategory::PrivilegeEscalation,
            FindingSeverity::High,
            "reference to the embedding parent window",
            r"window\.parent\b",
        ),
        ContentRule::new(
            "Top Window Reference",
            RuleCategory::PrivilegeEscalation,
            FindingSeverity::High,
            "reference to the top-level window",
            r"window\.top\b",
        ),
        ContentRule::new(
            "Opener Window Reference",
            RuleCategory::PrivilegeEscalation,
            FindingSeverity::High,
            "reference to the opener window",
            r"window\.opener\b",
        ),
        ContentRule::new(
            "Frame Element Reference",
            RuleCategory::PrivilegeEscalation,
            FindingSeverity::High,
            "reference to the hosting frame element",
            r"\bframeElement\b",
        ),
        // External resource references
        ContentRule::new(
            "External Script Source",
            RuleCategory::ExternalResource,
            FindingSeverity::Low,
            "script tag with external source",
            r#"<script[^>]+src\s*="#,
        ),
        ContentRule::new(
            "External Stylesheet",
            RuleCategory::ExternalResource,
            FindingSeverity::Low,
            "link tag with external href",
            r#"<link[^>]+href\s*="#,
        ),
        ContentRule::new(
            "External Image Source",
            RuleCategory::ExternalResource,
            FindingSeverity::Low,
            "img tag with external source",
            r#"<img[^>]+src\s*="#,
        ),
        ContentRule::new(
            "Module Import Literal",
            RuleCategory::ExternalResource,
            FindingSeverity::Low,
            "module import from a string literal",
            r#"\bimport\s+[^;]*\bfrom\s+['"]"#,
        ),
        ContentRule::new(
            "Require Literal",
            RuleCategory::ExternalResource,
            FindingSeverity::Low,
            "require of a string literal",
            r#"\brequire\s*\(\s*['"]"#,
        ),
    ];

    static ref URL_PATTERN: Regex = Regex::new(r#"https?://[^\s"'<>)]+"#).unwrap();
    static ref IPV4_HOST: Regex =
        Regex::new(r"^(?:\d{1,3}\.){3}\d{1,3}$").unwrap();
}

/// Configuration for the content scanner
#[derive(Debug, Clone)]
pub struct ContentScannerConfig {
    /// Files beyond this size are skipped (no penalty, logged).
    pub max_file_size_bytes: u64,
}

impl Default for ContentScannerConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Static pattern scanner over an extracted bundle file list
pub struct ContentScanner {
    config: ContentScannerConfig,
}

impl Default for ContentScanner {
    fn default() -> Self {
        Self::new(ContentScannerConfig::default())
    }
}

impl ContentScanner {
    pub fn new(config: ContentScannerConfig) -> Self {
        Self { config }
    }

    /// Scan an extracted file list and aggregate a report. A single
    /// unreadable file degrades to an informational finding; it never
    /// aborts the batch.
    pub fn scan(&self, files: &[PathBuf]) -> ScanReport {
        let mut findings = Vec::new();
        let mut libraries = BTreeSet::new();
        let mut malicious_urls = Vec::new();

        for path in files {
            if !is_scannable(path) {
                continue;
            }

            if let Ok(meta) = fs::metadata(path) {
                if meta.len() > self.config.max_file_size_bytes {
                    debug!(file = %path.display(), size = meta.len(), "Skipping oversized file");
                    continue;
                }
            }

            match fs::read_to_string(path) {
                Ok(text) => {
                    scan_text(path, &text, &mut findings, &mut libraries, &mut malicious_urls);
                }
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "File unreadable during scan");
                    findings.push(Finding {
                        rule: "Scan Error".to_string(),
                        severity: FindingSeverity::Info,
                        description: format!("file could not be read: {err}"),
                        location: Some(path.display().to_string()),
                    });
                }
            }
        }

        let threat_level = aggregate_threat_level(&findings, &malicious_urls);
        let suspicious_code_found = !malicious_urls.is_empty();

        debug!(
            findings = findings.len(),
            libraries = libraries.len(),
            malicious_urls = malicious_urls.len(),
            ?threat_level,
            "Bundle scan aggregated"
        );

        ScanReport {
            passed: threat_level != ThreatLevel::Critical,
            threat_level,
            findings,
            third_party_libraries: libraries,
            suspicious_code_found,
            malicious_urls,
            scanned_at: Utc::now(),
        }
    }
}

fn is_scannable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SCANNABLE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn scan_text(
    path: &Path,
    text: &str,
    findings: &mut Vec<Finding>,
    libraries: &mut BTreeSet<String>,
    malicious_urls: &mut Vec<String>,
) {
    // One finding per match occurrence, not per rule.
    for rule in CONTENT_RULES.iter() {
        let hits = rule.pattern.find_iter(text).count();
        if hits == 0 {
            continue;
        }
        debug!(
            rule = rule.name,
            category = ?rule.category,
            hits,
            file = %path.display(),
            "Content rule matched"
        );
        for _ in 0..hits {
            findings.push(Finding {
                rule: rule.name.to_string(),
                severity: rule.severity,
                description: rule.description.to_string(),
                location: Some(path.display().to_string()),
            });
        }
    }

    let lowered = text.to_lowercase();
    for library in KNOWN_LIBRARIES {
        if lowered.contains(library) {
            libraries.insert(library.to_string());
        }
    }

    // Duplicates are appended on purpose: volume matters for aggregation.
    for hit in URL_PATTERN.find_iter(text) {
        if is_suspicious_url(hit.as_str()) {
            malicious_urls.push(hit.as_str().to_string());
        }
    }
}

fn is_suspicious_url(url: &str) -> bool {
    let without_scheme = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host_port = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme);
    let host = host_port.split(':').next().unwrap_or(host_port);

    if IPV4_HOST.is_match(host) {
        return true;
    }

    let lowered = host.to_lowercase();
    SUSPICIOUS_TLDS.iter().any(|tld| lowered.ends_with(tld))
}

/// Aggregation rules, evaluated in this exact order, first match wins.
fn aggregate_threat_level(findings: &[Finding], malicious_urls: &[String]) -> ThreatLevel {
    let critical = count_severity(findings, FindingSeverity::Critical);
    let high = count_severity(findings, FindingSeverity::High);
    let medium = count_severity(findings, FindingSeverity::Medium);

    if critical > 0 || malicious_urls.len() > 3 {
        ThreatLevel::Critical
    } else if high > 3 || !malicious_urls.is_empty() {
        ThreatLevel::High
    } else if high > 0 || medium > 5 {
        ThreatLevel::Medium
    } else if medium > 0 || !findings.is_empty() {
        ThreatLevel::Low
    } else {
        ThreatLevel::None
    }
}

fn count_severity(findings: &[Finding], severity: FindingSeverity) -> usize {
    findings.iter().filter(|f| f.severity == severity).count()
}
