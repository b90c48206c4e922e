//! Compliance evaluator
//!
//! A fixed table maps each compliance code to the probe that owns it and a
//! pure evaluation function over that probe's findings. Evaluation never
//! performs I/O; when the owning probe failed, every code it owns becomes
//! indeterminate and carries the classified probe error as evidence.

use crate::app::config::PolicyConfig;
use crate::engine::model::{ComplianceCode, ComplianceVerdict};
use crate::error::ProbeError;
use crate::probe::component::{ComponentFindings, LibraryVersion};
use crate::probe::exposure::{ExposureFindings, LeakCategory};
use crate::probe::headers::HeaderFindings;
use crate::probe::transport::{PlaintextAccess, TlsVersion, TransportFindings};
use crate::probe::{ProbeFindings, ProbeKind, ProbeResult};

/// Evaluation function for one code, typed to its owning probe's findings
enum RuleEval {
    Transport(fn(&TransportFindings, &PolicyConfig) -> ComplianceVerdict),
    Component(fn(&ComponentFindings, &PolicyConfig) -> ComplianceVerdict),
    Exposure(fn(&ExposureFindings, &PolicyConfig) -> ComplianceVerdict),
    Headers(fn(&HeaderFindings, &PolicyConfig) -> ComplianceVerdict),
}

impl RuleEval {
    fn probe_kind(&self) -> ProbeKind {
        match self {
            RuleEval::Transport(_) => ProbeKind::Transport,
            RuleEval::Component(_) => ProbeKind::Component,
            RuleEval::Exposure(_) => ProbeKind::Exposure,
            RuleEval::Headers(_) => ProbeKind::Headers,
        }
    }
}

struct Rule {
    code: ComplianceCode,
    eval: RuleEval,
}

/// One row per compliance code, in code order. Adding a code means adding a
/// row here and a variant to `ComplianceCode`; nothing else changes.
const RULES: &[Rule] = &[
    Rule {
        code: ComplianceCode::S1_1,
        eval: RuleEval::Component(eval_jquery_usage),
    },
    Rule {
        code: ComplianceCode::S1_2,
        eval: RuleEval::Component(eval_jquery_version),
    },
    Rule {
        code: ComplianceCode::S2,
        eval: RuleEval::Transport(eval_plaintext_access),
    },
    Rule {
        code: ComplianceCode::S3,
        eval: RuleEval::Transport(eval_tls13_enabled),
    },
    Rule {
        code: ComplianceCode::S4,
        eval: RuleEval::Transport(eval_legacy_tls_refused),
    },
    Rule {
        code: ComplianceCode::S6_1,
        eval: RuleEval::Exposure(eval_directory_listing),
    },
    Rule {
        code: ComplianceCode::S6_2,
        eval: RuleEval::Exposure(eval_login_surface),
    },
    Rule {
        code: ComplianceCode::S6_3,
        eval: RuleEval::Exposure(eval_password_material),
    },
    Rule {
        code: ComplianceCode::S7,
        eval: RuleEval::Exposure(eval_access_control),
    },
    Rule {
        code: ComplianceCode::S8_1,
        eval: RuleEval::Headers(eval_frame_options),
    },
    Rule {
        code: ComplianceCode::S8_2,
        eval: RuleEval::Headers(eval_hsts),
    },
    Rule {
        code: ComplianceCode::S8_3,
        eval: RuleEval::Headers(eval_csp),
    },
];

/// Produce one verdict per defined compliance code, in code order. Probes
/// missing from `results` (target budget expiry) count as failed probes.
pub fn evaluate_target(results: &[ProbeResult], policy: &PolicyConfig) -> Vec<ComplianceVerdict> {
    let budget_expired = ProbeError::timeout("probe did not complete within the target budget");

    RULES
        .iter()
        .map(|rule| {
            let kind = rule.eval.probe_kind();
            let result = results.iter().find(|r| r.kind == kind);

            match result {
                Some(r) if r.succeeded() => match (&rule.eval, r.findings.as_ref()) {
                    (RuleEval::Transport(f), Some(ProbeFindings::Transport(t))) => f(t, policy),
                    (RuleEval::Component(f), Some(ProbeFindings::Component(c))) => f(c, policy),
                    (RuleEval::Exposure(f), Some(ProbeFindings::Exposure(e))) => f(e, policy),
                    (RuleEval::Headers(f), Some(ProbeFindings::Headers(h))) => f(h, policy),
                    _ => ComplianceVerdict::indeterminate(
                        rule.code,
                        &ProbeError::parse_failure("probe produced findings of the wrong shape"),
                    ),
                },
                Some(r) => {
                    let err = r
                        .error
                        .clone()
                        .unwrap_or_else(|| ProbeError::parse_failure("probe produced no findings"));
                    ComplianceVerdict::indeterminate(rule.code, &err)
                }
                None => ComplianceVerdict::indeterminate(rule.code, &budget_expired),
            }
        })
        .collect()
}

fn policy_minimum(policy: &PolicyConfig) -> semver::Version {
    LibraryVersion::parse(&policy.jquery_min_version)
        .map(|v| v.parsed)
        .unwrap_or_else(|| semver::Version::new(3, 5, 0))
}

fn eval_jquery_usage(findings: &ComponentFindings, policy: &PolicyConfig) -> ComplianceVerdict {
    let code = ComplianceCode::S1_1;
    match &findings.jquery {
        None => ComplianceVerdict::passed(code, "jQuery not used"),
        Some(detection) => match &detection.version {
            Some(version) if version.at_least(&policy_minimum(policy)) => ComplianceVerdict::passed(
                code,
                format!("jQuery {} in use ({})", version, detection.source),
            ),
            Some(version) => ComplianceVerdict::failed(
                code,
                format!(
                    "jQuery {} below required {} ({})",
                    version, policy.jquery_min_version, detection.source
                ),
            ),
            None => ComplianceVerdict::failed(
                code,
                format!("jQuery version not identifiable ({})", detection.source),
            ),
        },
    }
}

fn eval_jquery_version(findings: &ComponentFindings, policy: &PolicyConfig) -> ComplianceVerdict {
    let code = ComplianceCode::S1_2;
    match &findings.jquery {
        None => ComplianceVerdict::passed(code, "no jQuery version to assess"),
        Some(detection) => match &detection.version {
            Some(version) if version.at_least(&policy_minimum(policy)) => ComplianceVerdict::passed(
                code,
                format!("jQuery {} meets minimum {}", version, policy.jquery_min_version),
            ),
            Some(version) => ComplianceVerdict::failed(
                code,
                format!(
                    "jQuery {} has known vulnerabilities fixed in {}",
                    version, policy.jquery_min_version
                ),
            ),
            None => ComplianceVerdict::failed(
                code,
                format!("jQuery version not identifiable ({})", detection.source),
            ),
        },
    }
}

fn eval_plaintext_access(findings: &TransportFindings, _policy: &PolicyConfig) -> ComplianceVerdict {
    let code = ComplianceCode::S2;
    match &findings.plaintext {
        PlaintextAccess::Blocked { detail } => ComplianceVerdict::passed(code, detail.clone()),
        PlaintextAccess::RedirectsToHttps { location } => {
            ComplianceVerdict::passed(code, format!("plaintext redirects to {}", location))
        }
        PlaintextAccess::Open { status } => {
            let evidence = if matches!(status, 301 | 302 | 303 | 307 | 308) {
                format!("plaintext redirect does not lead to HTTPS (status {})", status)
            } else {
                format!("plaintext HTTP served content (status {})", status)
            };
            ComplianceVerdict::failed(code, evidence)
        }
    }
}

fn eval_tls13_enabled(findings: &TransportFindings, _policy: &PolicyConfig) -> ComplianceVerdict {
    let code = ComplianceCode::S3;
    if findings.accepts(TlsVersion::Tls13) {
        ComplianceVerdict::passed(code, "TLS 1.3 handshake accepted")
    } else {
        ComplianceVerdict::failed(code, "TLS 1.3 handshake refused")
    }
}

fn eval_legacy_tls_refused(findings: &TransportFindings, policy: &PolicyConfig) -> ComplianceVerdict {
    let code = ComplianceCode::S4;
    let accepted: Vec<&str> = policy
        .legacy_tls_versions
        .iter()
        .filter_map(|name| TlsVersion::from_policy_name(name))
        .filter(|&v| findings.accepts(v))
        .map(|v| v.as_str())
        .collect();

    if accepted.is_empty() {
        ComplianceVerdict::passed(code, "legacy TLS versions refused")
    } else {
        ComplianceVerdict::failed(code, format!("legacy TLS accepted: {}", accepted.join(", ")))
    }
}

fn leak_verdict(
    code: ComplianceCode,
    findings: &ExposureFindings,
    category: LeakCategory,
    clean: &str,
) -> ComplianceVerdict {
    let hits = findings.hits_in(category);
    if hits.is_empty() {
        ComplianceVerdict::passed(code, clean)
    } else {
        let first = hits[0];
        ComplianceVerdict::failed(
            code,
            format!("\"{}\" found at {}", first.signature, first.url),
        )
    }
}

fn eval_directory_listing(findings: &ExposureFindings, _policy: &PolicyConfig) -> ComplianceVerdict {
    leak_verdict(
        ComplianceCode::S6_1,
        findings,
        LeakCategory::DirectoryListing,
        "no directory-listing signatures",
    )
}

fn eval_login_surface(findings: &ExposureFindings, _policy: &PolicyConfig) -> ComplianceVerdict {
    leak_verdict(
        ComplianceCode::S6_2,
        findings,
        LeakCategory::LoginSurface,
        "no exposed login surface",
    )
}

fn eval_password_material(findings: &ExposureFindings, _policy: &PolicyConfig) -> ComplianceVerdict {
    leak_verdict(
        ComplianceCode::S6_3,
        findings,
        LeakCategory::PasswordMaterial,
        "no leaked credential material",
    )
}

fn eval_access_control(findings: &ExposureFindings, _policy: &PolicyConfig) -> ComplianceVerdict {
    let code = ComplianceCode::S7;

    if let Some(exposed) = findings.accessible_paths.first() {
        return ComplianceVerdict::failed(
            code,
            format!("{} publicly accessible (status {})", exposed.path, exposed.status),
        );
    }

    if findings.banner_discloses_version {
        let banner = findings.server_banner.as_deref().unwrap_or("");
        return ComplianceVerdict::failed(
            code,
            format!("Server header discloses software version: {}", banner),
        );
    }

    ComplianceVerdict::passed(code, "sensitive paths blocked, banner withholds versions")
}

fn eval_frame_options(findings: &HeaderFindings, _policy: &PolicyConfig) -> ComplianceVerdict {
    let code = ComplianceCode::S8_1;
    match findings.header("x-frame-options") {
        Some(value) => ComplianceVerdict::passed(code, format!("X-Frame-Options: {}", value)),
        None => ComplianceVerdict::failed(code, "X-Frame-Options header missing"),
    }
}

/// Accepts `max-age=N` anywhere in the header value, case-insensitive.
fn hsts_max_age(value: &str) -> Option<u64> {
    value.split(';').find_map(|directive| {
        let directive = directive.trim();
        let rest = directive
            .strip_prefix("max-age=")
            .or_else(|| directive.strip_prefix("Max-Age="))
            .or_else(|| {
                directive
                    .to_lowercase()
                    .starts_with("max-age=")
                    .then(|| &directive[8..])
            })?;
        rest.trim_matches('"').parse().ok()
    })
}

fn eval_hsts(findings: &HeaderFindings, policy: &PolicyConfig) -> ComplianceVerdict {
    let code = ComplianceCode::S8_2;
    let value = match findings.header("strict-transport-security") {
        Some(v) => v,
        None => {
            return ComplianceVerdict::failed(code, "Strict-Transport-Security header missing")
        }
    };

    match hsts_max_age(value) {
        Some(age) if age >= policy.hsts_min_max_age => {
            ComplianceVerdict::passed(code, format!("Strict-Transport-Security: {}", value))
        }
        Some(age) => ComplianceVerdict::failed(
            code,
            format!(
                "HSTS max-age {} below required {}",
                age, policy.hsts_min_max_age
            ),
        ),
        None => ComplianceVerdict::failed(code, format!("HSTS present without max-age: {}", value)),
    }
}

fn eval_csp(findings: &HeaderFindings, _policy: &PolicyConfig) -> ComplianceVerdict {
    let code = ComplianceCode::S8_3;
    match findings.header("content-security-policy") {
        Some(value) => {
            let shown: String = value.chars().take(120).collect();
            ComplianceVerdict::passed(code, format!("Content-Security-Policy: {}", shown))
        }
        None => ComplianceVerdict::failed(code, "Content-Security-Policy header missing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::VerdictStatus;
    use crate::probe::component::JqueryDetection;
    use crate::probe::exposure::{AccessiblePath, LeakHit};
    use crate::probe::transport::TlsAttempt;
    use std::collections::BTreeMap;

    fn policy() -> PolicyConfig {
        PolicyConfig::default()
    }

    fn component(jquery: Option<JqueryDetection>) -> ProbeResult {
        ProbeResult {
            kind: ProbeKind::Component,
            findings: Some(ProbeFindings::Component(ComponentFindings {
                jquery,
                script_urls: Vec::new(),
            })),
            error: None,
            duration_ms: 1,
        }
    }

    fn transport(plaintext: PlaintextAccess, accepted: &[TlsVersion]) -> ProbeResult {
        let tls: BTreeMap<TlsVersion, TlsAttempt> = TlsVersion::ALL
            .iter()
            .map(|&v| {
                let attempt = if accepted.contains(&v) {
                    TlsAttempt::Accepted {
                        detail: v.as_str().to_string(),
                    }
                } else {
                    TlsAttempt::Refused {
                        reason: "alert".to_string(),
                    }
                };
                (v, attempt)
            })
            .collect();
        ProbeResult {
            kind: ProbeKind::Transport,
            findings: Some(ProbeFindings::Transport(TransportFindings { plaintext, tls })),
            error: None,
            duration_ms: 1,
        }
    }

    fn headers(pairs: &[(&str, &str)]) -> ProbeResult {
        ProbeResult {
            kind: ProbeKind::Headers,
            findings: Some(ProbeFindings::Headers(HeaderFindings {
                status: 200,
                final_url: "https://example.com/".to_string(),
                headers: pairs
                    .iter()
                    .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                    .collect(),
            })),
            error: None,
            duration_ms: 1,
        }
    }

    fn exposure(findings: ExposureFindings) -> ProbeResult {
        ProbeResult {
            kind: ProbeKind::Exposure,
            findings: Some(ProbeFindings::Exposure(findings)),
            error: None,
            duration_ms: 1,
        }
    }

    fn clean_exposure() -> ExposureFindings {
        ExposureFindings {
            robots_disallows: Vec::new(),
            leak_hits: Vec::new(),
            accessible_paths: Vec::new(),
            server_banner: Some("nginx".to_string()),
            banner_discloses_version: false,
        }
    }

    fn verdict_for(verdicts: &[ComplianceVerdict], code: ComplianceCode) -> &ComplianceVerdict {
        verdicts.iter().find(|v| v.code == code).unwrap()
    }

    #[test]
    fn every_code_gets_exactly_one_verdict() {
        let verdicts = evaluate_target(&[], &policy());
        assert_eq!(verdicts.len(), ComplianceCode::ALL.len());
        for (verdict, &code) in verdicts.iter().zip(ComplianceCode::ALL) {
            assert_eq!(verdict.code, code);
            assert_eq!(verdict.status, VerdictStatus::Indeterminate);
        }
    }

    #[test]
    fn jquery_absent_passes_both_codes_with_distinct_evidence() {
        let verdicts = evaluate_target(&[component(None)], &policy());
        let s1_1 = verdict_for(&verdicts, ComplianceCode::S1_1);
        let s1_2 = verdict_for(&verdicts, ComplianceCode::S1_2);
        assert_eq!(s1_1.status, VerdictStatus::Passed);
        assert_eq!(s1_2.status, VerdictStatus::Passed);
        assert_ne!(s1_1.evidence, s1_2.evidence);
    }

    #[test]
    fn old_jquery_fails_both_codes() {
        let detection = JqueryDetection {
            version: LibraryVersion::parse("1.12.4"),
            source: "https://example.com/jquery-1.12.4.js".to_string(),
        };
        let verdicts = evaluate_target(&[component(Some(detection))], &policy());
        assert_eq!(
            verdict_for(&verdicts, ComplianceCode::S1_1).status,
            VerdictStatus::Failed
        );
        assert_eq!(
            verdict_for(&verdicts, ComplianceCode::S1_2).status,
            VerdictStatus::Failed
        );
    }

    #[test]
    fn unidentifiable_jquery_version_fails() {
        let detection = JqueryDetection {
            version: None,
            source: "https://example.com/jquery.min.js".to_string(),
        };
        let verdicts = evaluate_target(&[component(Some(detection))], &policy());
        let s1_2 = verdict_for(&verdicts, ComplianceCode::S1_2);
        assert_eq!(s1_2.status, VerdictStatus::Failed);
        assert!(s1_2.evidence.contains("not identifiable"));
    }

    #[test]
    fn blocked_plaintext_and_redirect_both_pass() {
        let blocked = evaluate_target(
            &[transport(
                PlaintextAccess::Blocked {
                    detail: "connection refused".to_string(),
                },
                &[TlsVersion::Tls13],
            )],
            &policy(),
        );
        assert_eq!(
            verdict_for(&blocked, ComplianceCode::S2).status,
            VerdictStatus::Passed
        );

        let redirected = evaluate_target(
            &[transport(
                PlaintextAccess::RedirectsToHttps {
                    location: "https://example.com/".to_string(),
                },
                &[TlsVersion::Tls13],
            )],
            &policy(),
        );
        assert_eq!(
            verdict_for(&redirected, ComplianceCode::S2).status,
            VerdictStatus::Passed
        );
    }

    #[test]
    fn open_plaintext_fails() {
        let verdicts = evaluate_target(
            &[transport(PlaintextAccess::Open { status: 200 }, &[TlsVersion::Tls13])],
            &policy(),
        );
        let s2 = verdict_for(&verdicts, ComplianceCode::S2);
        assert_eq!(s2.status, VerdictStatus::Failed);
        assert!(s2.evidence.contains("served content"));
    }

    #[test]
    fn plaintext_redirect_off_https_fails_with_redirect_evidence() {
        let verdicts = evaluate_target(
            &[transport(PlaintextAccess::Open { status: 301 }, &[TlsVersion::Tls13])],
            &policy(),
        );
        let s2 = verdict_for(&verdicts, ComplianceCode::S2);
        assert_eq!(s2.status, VerdictStatus::Failed);
        assert!(s2.evidence.contains("redirect"));
        assert!(!s2.evidence.contains("served content"));
    }

    #[test]
    fn tls_version_matrix() {
        let verdicts = evaluate_target(
            &[transport(
                PlaintextAccess::Blocked {
                    detail: "refused".to_string(),
                },
                &[TlsVersion::Tls13, TlsVersion::Tls12],
            )],
            &policy(),
        );
        assert_eq!(
            verdict_for(&verdicts, ComplianceCode::S3).status,
            VerdictStatus::Passed
        );
        assert_eq!(
            verdict_for(&verdicts, ComplianceCode::S4).status,
            VerdictStatus::Passed
        );
    }

    #[test]
    fn accepted_legacy_tls_fails_s4() {
        let verdicts = evaluate_target(
            &[transport(
                PlaintextAccess::Blocked {
                    detail: "refused".to_string(),
                },
                &[TlsVersion::Tls13, TlsVersion::Tls10],
            )],
            &policy(),
        );
        let s4 = verdict_for(&verdicts, ComplianceCode::S4);
        assert_eq!(s4.status, VerdictStatus::Failed);
        assert!(s4.evidence.contains("TLS1.0"));
    }

    #[test]
    fn leak_hits_fail_their_category_only() {
        let mut findings = clean_exposure();
        findings.leak_hits.push(LeakHit {
            category: LeakCategory::DirectoryListing,
            signature: "index of /".to_string(),
            url: "https://example.com/backup/".to_string(),
        });
        let verdicts = evaluate_target(&[exposure(findings)], &policy());
        assert_eq!(
            verdict_for(&verdicts, ComplianceCode::S6_1).status,
            VerdictStatus::Failed
        );
        assert_eq!(
            verdict_for(&verdicts, ComplianceCode::S6_2).status,
            VerdictStatus::Passed
        );
        assert_eq!(
            verdict_for(&verdicts, ComplianceCode::S6_3).status,
            VerdictStatus::Passed
        );
    }

    #[test]
    fn s7_requires_paths_blocked_and_quiet_banner() {
        let clean = evaluate_target(&[exposure(clean_exposure())], &policy());
        assert_eq!(
            verdict_for(&clean, ComplianceCode::S7).status,
            VerdictStatus::Passed
        );

        let mut exposed = clean_exposure();
        exposed.accessible_paths.push(AccessiblePath {
            path: "/.env".to_string(),
            status: 200,
        });
        let verdicts = evaluate_target(&[exposure(exposed)], &policy());
        assert_eq!(
            verdict_for(&verdicts, ComplianceCode::S7).status,
            VerdictStatus::Failed
        );

        let mut chatty = clean_exposure();
        chatty.server_banner = Some("Apache/2.4.41".to_string());
        chatty.banner_discloses_version = true;
        let verdicts = evaluate_target(&[exposure(chatty)], &policy());
        assert_eq!(
            verdict_for(&verdicts, ComplianceCode::S7).status,
            VerdictStatus::Failed
        );
    }

    #[test]
    fn header_rules() {
        let verdicts = evaluate_target(
            &[headers(&[
                ("X-Frame-Options", "SAMEORIGIN"),
                ("Strict-Transport-Security", "max-age=31536000; includeSubDomains"),
                ("Content-Security-Policy", "default-src 'self'"),
            ])],
            &policy(),
        );
        for code in [
            ComplianceCode::S8_1,
            ComplianceCode::S8_2,
            ComplianceCode::S8_3,
        ] {
            assert_eq!(verdict_for(&verdicts, code).status, VerdictStatus::Passed);
        }
    }

    #[test]
    fn short_hsts_max_age_fails() {
        let verdicts = evaluate_target(
            &[headers(&[("Strict-Transport-Security", "max-age=300")])],
            &policy(),
        );
        let s8_2 = verdict_for(&verdicts, ComplianceCode::S8_2);
        assert_eq!(s8_2.status, VerdictStatus::Failed);
        assert!(s8_2.evidence.contains("300"));
    }

    #[test]
    fn missing_headers_fail() {
        let verdicts = evaluate_target(&[headers(&[])], &policy());
        for code in [
            ComplianceCode::S8_1,
            ComplianceCode::S8_2,
            ComplianceCode::S8_3,
        ] {
            assert_eq!(verdict_for(&verdicts, code).status, VerdictStatus::Failed);
        }
    }

    #[test]
    fn failed_probe_makes_owned_codes_indeterminate() {
        let failed = ProbeResult::failed(
            ProbeKind::Transport,
            ProbeError::network("no route to host"),
            5,
        );
        let verdicts = evaluate_target(&[failed, headers(&[])], &policy());

        for code in [ComplianceCode::S2, ComplianceCode::S3, ComplianceCode::S4] {
            let verdict = verdict_for(&verdicts, code);
            assert_eq!(verdict.status, VerdictStatus::Indeterminate);
            assert!(verdict.evidence.contains("no route to host"));
        }
        // Header codes still evaluate from their own probe
        assert_eq!(
            verdict_for(&verdicts, ComplianceCode::S8_1).status,
            VerdictStatus::Failed
        );
    }

    #[test]
    fn hsts_max_age_parsing() {
        assert_eq!(hsts_max_age("max-age=31536000"), Some(31_536_000));
        assert_eq!(
            hsts_max_age("includeSubDomains; max-age=63072000; preload"),
            Some(63_072_000)
        );
        assert_eq!(hsts_max_age("Max-Age=100"), Some(100));
        assert_eq!(hsts_max_age("includeSubDomains"), None);
    }
}
