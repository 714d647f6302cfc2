//! Statute and precedent discovery, and evidence packet preparation.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

use crate::agents::CaseAnalysis;
use crate::config::ResearchConfig;
use crate::error::{ResearchError, SimWarning};
use crate::evidence::{EvidencePacket, Jurisdiction, PrecedentRef, StatuteRef};
use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};
use crate::retry::{is_retryable_http_error, is_retryable_network_error, retry_async, RetryConfig, Retryable};

/// Results of one search. Empty findings are a valid answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    #[serde(default)]
    pub statutes: Vec<StatuteRef>,
    #[serde(default)]
    pub precedents: Vec<PrecedentRef>,
}

impl Findings {
    pub fn is_empty(&self) -> bool {
        self.statutes.is_empty() && self.precedents.is_empty()
    }
}

#[async_trait]
pub trait Researcher: Send + Sync {
    async fn search(&self, topic: &str, jurisdiction: &Jurisdiction) -> Result<Findings, ResearchError>;
}

/// Never finds anything.
pub struct NullResearcher;

#[async_trait]
impl Researcher for NullResearcher {
    async fn search(&self, _topic: &str, _jurisdiction: &Jurisdiction) -> Result<Findings, ResearchError> {
        Ok(Findings::default())
    }
}

/// Returns the same findings for every query.
pub struct StaticResearcher {
    findings: Findings,
}

impl StaticResearcher {
    pub fn new(findings: Findings) -> Self {
        Self { findings }
    }

    /// Core federal and uniform-act authorities for trade secret disputes.
    pub fn trade_secret_defaults() -> Self {
        Self::new(Findings {
            statutes: vec![
                StatuteRef {
                    title: "Defend Trade Secrets Act".into(),
                    citation: "18 U.S.C. § 1836".into(),
                    section: "1836(b)".into(),
                    relevance: "Federal civil action for trade secret misappropriation".into(),
                },
                StatuteRef {
                    title: "Definitions".into(),
                    citation: "18 U.S.C. § 1839".into(),
                    section: "1839(3), 1839(5)".into(),
                    relevance: "Defines trade secret and misappropriation".into(),
                },
                StatuteRef {
                    title: "Uniform Trade Secrets Act".into(),
                    citation: "UTSA § 1".into(),
                    section: "1(4)".into(),
                    relevance: "State-law definition adopted in most jurisdictions".into(),
                },
            ],
            precedents: vec![
                PrecedentRef {
                    case_name: "Kewanee Oil Co. v. Bicron Corp.".into(),
                    year: Some(1974),
                    citation: "416 U.S. 470".into(),
                    relevance: "State trade secret law is not preempted by federal patent law".into(),
                },
                PrecedentRef {
                    case_name: "Ruckelshaus v. Monsanto Co.".into(),
                    year: Some(1984),
                    citation: "467 U.S. 986".into(),
                    relevance: "Trade secrets are property; secrecy must be reasonably maintained".into(),
                },
                PrecedentRef {
                    case_name: "Waymo LLC v. Uber Technologies, Inc.".into(),
                    year: Some(2018),
                    citation: "No. 3:17-cv-00939 (N.D. Cal.)".into(),
                    relevance: "Departing engineer's mass download of design files".into(),
                },
            ],
        })
    }
}

#[async_trait]
impl Researcher for StaticResearcher {
    async fn search(&self, _topic: &str, _jurisdiction: &Jurisdiction) -> Result<Findings, ResearchError> {
        Ok(self.findings.clone())
    }
}

/// JSON-over-HTTP research backend.
///
/// Request: `POST <endpoint>` with `{query, jurisdiction, max_results}`;
/// response: `{"statutes": [...], "precedents": [...]}`.
pub struct HttpResearcher {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_results: usize,
    timeout_ms: u64,
    retry: RetryConfig,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    jurisdiction: String,
    max_results: usize,
}

#[derive(Debug)]
struct CallError {
    error: ResearchError,
    retryable: bool,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl Retryable for CallError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl HttpResearcher {
    pub fn new(cfg: &ResearchConfig) -> anyhow::Result<Self> {
        let endpoint = cfg
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("RESEARCH_ENDPOINT is required for the HTTP researcher"))?;
        Ok(Self {
            client: Client::builder().build()?,
            endpoint,
            api_key: cfg.api_key.clone(),
            max_results: cfg.max_results,
            timeout_ms: cfg.timeout_ms,
            retry: RetryConfig::default(),
        })
    }

    async fn call_once(&self, topic: &str, jurisdiction: &Jurisdiction) -> Result<Findings, CallError> {
        let body = SearchRequest {
            query: topic,
            jurisdiction: jurisdiction.to_string(),
            max_results: self.max_results,
        };
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let exchange = async {
            let resp = req.send().await.map_err(|e| CallError {
                retryable: is_retryable_network_error(&e),
                error: ResearchError::Unavailable(e.to_string()),
            })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(CallError {
                    retryable: is_retryable_http_error(status.as_u16()),
                    error: ResearchError::Unavailable(format!("http status {}", status.as_u16())),
                });
            }
            resp.json::<Findings>().await.map_err(|e| CallError {
                retryable: false,
                error: ResearchError::Malformed(e.to_string()),
            })
        };
        match timeout(Duration::from_millis(self.timeout_ms), exchange).await {
            Ok(result) => result,
            Err(_) => Err(CallError {
                error: ResearchError::Unavailable(format!("timed out after {} ms", self.timeout_ms)),
                retryable: true,
            }),
        }
    }
}

#[async_trait]
impl Researcher for HttpResearcher {
    async fn search(&self, topic: &str, jurisdiction: &Jurisdiction) -> Result<Findings, ResearchError> {
        retry_async(&self.retry, Domain::Research, topic, || self.call_once(topic, jurisdiction))
            .await
            .map_err(|e| e.error)
    }
}

/// Statute queries: the two baseline acts plus up to two issue-specific queries.
pub fn statute_queries(legal_issues: &[String]) -> Vec<String> {
    let mut queries = vec![
        "DTSA Defend Trade Secrets Act requirements elements".to_string(),
        "UTSA Uniform Trade Secrets Act provisions".to_string(),
    ];
    queries.extend(legal_issues.iter().take(2).map(|i| format!("trade secret law {}", i)));
    queries
}

/// Precedent queries: jurisdiction-specific, landmark, plus up to two issue queries.
pub fn precedent_queries(legal_issues: &[String], jurisdiction: &Jurisdiction) -> Vec<String> {
    let mut queries = vec![
        format!("trade secret misappropriation cases {}", jurisdiction),
        "landmark trade secret cases federal circuit".to_string(),
    ];
    queries.extend(legal_issues.iter().take(2).map(|i| format!("trade secret precedent {}", i)));
    queries
}

/// Packet plus the non-fatal problems met while building it.
#[derive(Debug, Clone)]
pub struct PreparedEvidence {
    pub packet: EvidencePacket,
    pub warnings: Vec<SimWarning>,
}

/// Turns a description and its analysis into an evidence packet.
pub struct EvidencePreparer<'a> {
    researcher: &'a dyn Researcher,
    config: &'a ResearchConfig,
}

impl<'a> EvidencePreparer<'a> {
    pub fn new(researcher: &'a dyn Researcher, config: &'a ResearchConfig) -> Self {
        Self { researcher, config }
    }

    /// Never fails: search errors and empty results yield an impoverished packet
    /// and an `EvidenceIncomplete` warning.
    pub async fn prepare(
        &self,
        description: &str,
        jurisdiction: &Jurisdiction,
        analysis: &CaseAnalysis,
    ) -> PreparedEvidence {
        let _scope = ProfileScope::new("research.prepare");
        let mut warnings = Vec::new();
        let mut statutes = Vec::new();
        let mut precedents = Vec::new();
        let mut seen_statutes = HashSet::new();
        let mut seen_precedents = HashSet::new();
        let mut failures = 0usize;

        let queries = statute_queries(&analysis.legal_issues)
            .into_iter()
            .chain(precedent_queries(&analysis.legal_issues, jurisdiction));
        for query in queries {
            match self.researcher.search(&query, jurisdiction).await {
                Ok(found) => {
                    for s in found.statutes {
                        if seen_statutes.insert(dedupe_key(&s.citation, &s.title)) {
                            statutes.push(s);
                        }
                    }
                    for p in found.precedents {
                        if seen_precedents.insert(dedupe_key(&p.citation, &p.case_name)) {
                            precedents.push(p);
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    log(
                        Level::Warn,
                        Domain::Research,
                        "search_failed",
                        obj(&[("query", v_str(&query)), ("error", v_str(&e.to_string()))]),
                    );
                }
            }
        }

        let packet = EvidencePacket::builder(description)
            .jurisdiction(jurisdiction.clone())
            .has_nda(analysis.has_nda)
            .evidence_strength(analysis.evidence_strength)
            .venue_bias(analysis.venue_bias)
            .statutes(statutes)
            .precedents(precedents)
            .truncate_authorities(self.config.max_statutes, self.config.max_precedents)
            .facts(analysis.key_facts.clone())
            .plaintiff_claims(analysis.plaintiff_claims.clone())
            .defendant_claims(analysis.defendant_claims.clone())
            .disputed_facts(analysis.disputed_facts.clone())
            .build();

        if packet.is_impoverished() {
            warnings.push(SimWarning::EvidenceIncomplete {
                reason: if failures > 0 {
                    format!("{} research queries failed and no authorities were found", failures)
                } else {
                    "research found no statutes or precedents".to_string()
                },
            });
        } else if failures > 0 {
            warnings.push(SimWarning::EvidenceIncomplete {
                reason: format!("{} research queries failed", failures),
            });
        }
        for w in &warnings {
            log(Level::Warn, Domain::Research, "evidence_incomplete", obj(&[("reason", v_str(&w.to_string()))]));
        }
        log(
            Level::Info,
            Domain::Research,
            "evidence_prepared",
            obj(&[
                ("statutes", serde_json::json!(packet.statutes.len())),
                ("precedents", serde_json::json!(packet.precedents.len())),
                ("has_nda", serde_json::Value::Bool(packet.has_nda)),
                ("evidence_strength", v_str(packet.evidence_strength.as_str())),
            ]),
        );
        PreparedEvidence { packet, warnings }
    }
}

fn dedupe_key(citation: &str, name: &str) -> String {
    let key = if citation.trim().is_empty() { name } else { citation };
    key.trim().to_lowercase()
}
