use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use super::Severity;

/// A finding pattern the simulated executor draws from.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FindingTemplate {
    pub name: String,
    pub severity: Severity,
    /// Base score before jitter.
    pub score: f64,
    pub port: String,
    pub description: String,
    pub solution: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TemplateSet {
    #[serde(default)]
    pub name: Option<String>,
    pub templates: Vec<FindingTemplate>,
}

struct BuiltinTemplate {
    name: &'static str,
    severity: Severity,
    score: f64,
    port: &'static str,
    description: &'static str,
    solution: &'static str,
}

const BUILTIN: &[BuiltinTemplate] = &[
    BuiltinTemplate {
        name: "OpenSSL Heartbleed Vulnerability",
        severity: Severity::Critical,
        score: 9.8,
        port: "443/tcp",
        description: "The Heartbleed Bug is a serious vulnerability in the popular OpenSSL cryptographic software library. This weakness allows stealing the information protected, under normal conditions, by the SSL/TLS encryption.",
        solution: "Update OpenSSL to version 1.0.1g or later. Regenerate all SSL certificates and private keys.",
    },
    BuiltinTemplate {
        name: "Apache HTTP Server Multiple Vulnerabilities",
        severity: Severity::High,
        score: 7.5,
        port: "80/tcp",
        description: "Multiple vulnerabilities have been discovered in Apache HTTP Server that could allow remote attackers to cause denial of service or potentially execute arbitrary code.",
        solution: "Upgrade Apache HTTP Server to the latest stable version. Review and update server configuration.",
    },
    BuiltinTemplate {
        name: "Weak SSH Encryption Algorithms",
        severity: Severity::Medium,
        score: 5.3,
        port: "22/tcp",
        description: "The SSH server is configured to support weak encryption algorithms that are vulnerable to cryptographic attacks.",
        solution: "Disable weak ciphers in SSH configuration. Use only strong encryption algorithms like AES-256.",
    },
    BuiltinTemplate {
        name: "TLS/SSL Deprecated Protocol",
        severity: Severity::Medium,
        score: 4.8,
        port: "443/tcp",
        description: "The server supports deprecated SSL/TLS protocols (SSLv2, SSLv3, TLS 1.0) that have known security vulnerabilities.",
        solution: "Disable SSLv2, SSLv3, and TLS 1.0. Enable only TLS 1.2 and TLS 1.3.",
    },
    BuiltinTemplate {
        name: "HTTP TRACE Method Enabled",
        severity: Severity::Low,
        score: 2.6,
        port: "80/tcp",
        description: "The HTTP TRACE method is enabled on the web server, which could be exploited for cross-site tracing attacks.",
        solution: "Disable the HTTP TRACE method in the web server configuration.",
    },
    BuiltinTemplate {
        name: "TCP Timestamps Enabled",
        severity: Severity::Log,
        score: 0.0,
        port: "general/tcp",
        description: "TCP timestamps are enabled, which may allow remote attackers to estimate the system uptime.",
        solution: "This is informational. Consider disabling TCP timestamps if not required.",
    },
    BuiltinTemplate {
        name: "OS Identification",
        severity: Severity::Log,
        score: 0.0,
        port: "general/tcp",
        description: "The operating system of the remote host has been identified through various fingerprinting techniques.",
        solution: "This is informational. No action required.",
    },
    BuiltinTemplate {
        name: "Outdated PHP Version",
        severity: Severity::High,
        score: 8.1,
        port: "80/tcp",
        description: "The PHP version running on the server is outdated and contains known security vulnerabilities.",
        solution: "Update PHP to the latest stable version. Review and update all PHP applications.",
    },
    BuiltinTemplate {
        name: "MySQL Default Credentials",
        severity: Severity::Critical,
        score: 9.1,
        port: "3306/tcp",
        description: "The MySQL database server is using default or weak credentials that can be easily guessed.",
        solution: "Change all default passwords immediately. Implement strong password policies.",
    },
    BuiltinTemplate {
        name: "Directory Listing Enabled",
        severity: Severity::Low,
        score: 3.1,
        port: "80/tcp",
        description: "Directory listing is enabled on the web server, exposing the directory structure and files.",
        solution: "Disable directory listing in the web server configuration.",
    },
    BuiltinTemplate {
        name: "SQL Injection Vulnerability",
        severity: Severity::Critical,
        score: 9.3,
        port: "80/tcp",
        description: "The web application is vulnerable to SQL injection attacks that could allow unauthorized database access.",
        solution: "Use parameterized queries and prepared statements. Implement input validation and sanitization.",
    },
    BuiltinTemplate {
        name: "Cross-Site Scripting (XSS)",
        severity: Severity::High,
        score: 7.2,
        port: "443/tcp",
        description: "The application is vulnerable to cross-site scripting attacks that could allow execution of malicious scripts.",
        solution: "Implement proper output encoding and Content Security Policy headers.",
    },
    BuiltinTemplate {
        name: "Unpatched Windows SMB Vulnerability",
        severity: Severity::Critical,
        score: 9.8,
        port: "445/tcp",
        description: "The Windows SMB service contains critical vulnerabilities that could allow remote code execution.",
        solution: "Apply the latest Windows security updates immediately. Consider disabling SMBv1.",
    },
    BuiltinTemplate {
        name: "Weak Password Policy",
        severity: Severity::Medium,
        score: 5.5,
        port: "general/tcp",
        description: "The system has a weak password policy that allows easily guessable passwords.",
        solution: "Implement strong password requirements including length, complexity, and expiration.",
    },
    BuiltinTemplate {
        name: "Missing Security Headers",
        severity: Severity::Low,
        score: 3.7,
        port: "443/tcp",
        description: "The web server is missing important security headers like X-Frame-Options and X-Content-Type-Options.",
        solution: "Configure security headers in the web server or application configuration.",
    },
];

pub fn builtin_templates() -> Vec<FindingTemplate> {
    BUILTIN
        .iter()
        .map(|t| FindingTemplate {
            name: t.name.to_string(),
            severity: t.severity,
            score: t.score,
            port: t.port.to_string(),
            description: t.description.to_string(),
            solution: t.solution.to_string(),
        })
        .collect()
}

/// Reads every `.yaml`/`.yml` file under `path`. A file may hold a single
/// template or a `templates:` set; files that parse as neither are skipped
/// with a warning.
pub fn load_templates_from_dir<P: AsRef<Path>>(path: P) -> Result<Vec<FindingTemplate>> {
    let mut templates = Vec::new();

    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_yaml = path
            .extension()
            .map_or(false, |ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read template file: {:?}", path))?;

        // Try to parse as TemplateSet first, then as single template
        let parsed = if let Ok(set) = serde_yaml::from_str::<TemplateSet>(&content) {
            set.templates
        } else if let Ok(template) = serde_yaml::from_str::<FindingTemplate>(&content) {
            vec![template]
        } else {
            tracing::warn!(file = ?path, "failed to parse finding template file");
            continue;
        };

        for template in parsed {
            if !(0.0..=10.0).contains(&template.score) {
                tracing::warn!(
                    file = ?path,
                    template = %template.name,
                    score = template.score,
                    "template score outside [0, 10], skipped"
                );
                continue;
            }
            templates.push(template);
        }
    }

    Ok(templates)
}
