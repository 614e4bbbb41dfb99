//! Detector Set - rule-based policy checks over an input/output pair.
//!
//! Each detector is a pure function over a static rule table. A rule maps a
//! case-insensitive pattern to a category with fixed severity and confidence,
//! so identical text always yields identical violations.

use std::panic::{catch_unwind, AssertUnwindSafe};

use regex::Regex;

use crate::domain::{DetectorToggles, SeverityLevel, TextSource, Violation, ViolationType};
use crate::error::{GovernanceError, GovernanceResult};

/// Declarative detection rule.
#[derive(Debug)]
pub struct RuleSpec {
    pub id: &'static str,
    pub category: ViolationType,
    pub pattern: &'static str,
    pub description: &'static str,
    pub severity: f64,
    pub confidence: f64,
    pub reason: &'static str,
    pub regulatory_framework: &'static str,
    pub remediation: &'static [&'static str],
}

/// Protected groups referenced by the bias and hate-speech rules.
macro_rules! protected_groups {
    () => {
        r"(?:women|men|girls|boys|muslims|christians|jews|hindus|buddhists|atheists|blacks|whites|asians|hispanics|latinos|arabs|africans|mexicans|immigrants|refugees|gays|lesbians|trans\s+people|disabled\s+people|old\s+people|the\s+elderly)"
    };
}

pub const PII_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "pii.email",
        category: ViolationType::Pii,
        pattern: r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
        description: "Email address detected",
        severity: 5.0,
        confidence: 0.95,
        reason: "Text contains an email address that can identify a person",
        regulatory_framework: "GDPR Art. 4(1), CCPA",
        remediation: &["Redact the email address", "Confirm a lawful basis before processing contact data"],
    },
    RuleSpec {
        id: "pii.ssn",
        category: ViolationType::Pii,
        pattern: r"\b\d{3}-\d{2}-\d{4}\b",
        description: "Social Security Number pattern detected",
        severity: 8.0,
        confidence: 0.9,
        reason: "Text contains a national identifier in SSN format",
        regulatory_framework: "GDPR Art. 87, CCPA, GLBA",
        remediation: &["Remove the identifier", "Never echo government identifiers in model output"],
    },
    RuleSpec {
        id: "pii.credit_card",
        category: ViolationType::Pii,
        pattern: r"\b(?:\d{4}[-\s]?){3}\d{4}\b",
        description: "Payment card number pattern detected",
        severity: 8.0,
        confidence: 0.85,
        reason: "Text contains a 16-digit payment card number",
        regulatory_framework: "PCI DSS Req. 3, GDPR Art. 32",
        remediation: &["Mask all but the last four digits", "Route payment data through a tokenizing vault"],
    },
    RuleSpec {
        id: "pii.phone",
        category: ViolationType::Pii,
        pattern: r"(?:\+?1[-.\s]?)?\(?\b\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b",
        description: "Phone number detected",
        severity: 4.0,
        confidence: 0.7,
        reason: "Text contains a phone number that can identify a person",
        regulatory_framework: "GDPR Art. 4(1), TCPA",
        remediation: &["Redact the phone number"],
    },
];

pub const BIAS_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "bias.group_generalization",
        category: ViolationType::Bias,
        pattern: concat!(
            r"(?i)\b(?:all|every|most)\s+",
            protected_groups!(),
            r"\s+(?:are|is|can't|cannot|should|never|always)\b"
        ),
        description: "Categorical generalization about a protected group",
        severity: 6.0,
        confidence: 0.7,
        reason: "Attributes a trait to an entire protected group",
        regulatory_framework: "EU AI Act Art. 10, Equality Act 2010",
        remediation: &["Rephrase without generalizing over the group", "Cite evidence about individuals, not groups"],
    },
    RuleSpec {
        id: "bias.inherent_inferiority",
        category: ViolationType::Bias,
        pattern: concat!(
            r"(?i)\b",
            protected_groups!(),
            r"\s+are\s+(?:naturally|inherently|genetically|biologically)\s+(?:inferior|worse|less\s+intelligent|stupid|lazy|violent|weaker)\b"
        ),
        description: "Claim of inherent inferiority of a protected group",
        severity: 7.5,
        confidence: 0.85,
        reason: "Asserts a protected group is innately inferior",
        regulatory_framework: "EU AI Act Art. 5, ECHR Art. 14",
        remediation: &["Refuse the premise", "Provide factual context on group-level claims"],
    },
    RuleSpec {
        id: "bias.role_stereotype",
        category: ViolationType::Bias,
        pattern: r"(?i)\b(?:women|men|girls|boys)\s+(?:belong|should\s+stay|should\s+only\s+work)\s+(?:in\s+the\s+kitchen|at\s+home|in\s+the\s+house)\b",
        description: "Gender role stereotype",
        severity: 6.5,
        confidence: 0.85,
        reason: "Prescribes a social role based on gender",
        regulatory_framework: "EU AI Act Art. 10, Title VII",
        remediation: &["Remove the prescriptive gender role"],
    },
];

pub const HATE_SPEECH_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "hate_speech.dehumanizing",
        category: ViolationType::HateSpeech,
        pattern: concat!(
            r"(?i)\b(?:",
            protected_groups!(),
            r"|those\s+people)\s+are\s+(?:animals|vermin|parasites|subhuman|cockroaches|rats|a\s+disease|a\s+plague)\b"
        ),
        description: "Dehumanizing language about a group",
        severity: 8.5,
        confidence: 0.85,
        reason: "Compares people to animals, vermin or disease",
        regulatory_framework: "EU DSA Art. 34, EU Framework Decision 2008/913/JHA",
        remediation: &["Block the content", "Escalate repeated occurrences for review"],
    },
    RuleSpec {
        id: "hate_speech.elimination_call",
        category: ViolationType::HateSpeech,
        pattern: concat!(
            r"(?i)\b(?:exterminate|eradicate|get\s+rid\s+of|wipe\s+out|purge)\s+(?:all\s+)?(?:the\s+)?",
            protected_groups!()
        ),
        description: "Call for elimination of a group",
        severity: 9.5,
        confidence: 0.85,
        reason: "Calls for removing or destroying a protected group",
        regulatory_framework: "EU Framework Decision 2008/913/JHA, ICCPR Art. 20",
        remediation: &["Block the content", "Preserve the record for trust and safety review"],
    },
    RuleSpec {
        id: "hate_speech.supremacy",
        category: ViolationType::HateSpeech,
        pattern: r"(?i)\b(?:white|racial|ethnic)\s+(?:supremacy|superiority)\s+(?:is|was)\s+(?:right|justified|natural|true)\b",
        description: "Endorsement of racial supremacy",
        severity: 8.0,
        confidence: 0.8,
        reason: "Endorses the superiority of one race over others",
        regulatory_framework: "ICERD Art. 4, EU DSA Art. 34",
        remediation: &["Block the content"],
    },
];

pub const VIOLENCE_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "violence.harm_instructions",
        category: ViolationType::Violence,
        pattern: r"(?i)\b(?:how\s+(?:to|do\s+i|can\s+i|would\s+i|should\s+i)|ways?\s+to|best\s+way\s+to|help\s+me|teach\s+me\s+(?:how\s+)?to|instructions?\s+(?:to|for))\s+(?:kill|murder|poison|stab|strangle|shoot|assassinate|torture|hurt)\b",
        description: "Request for instructions to harm or kill",
        severity: 9.5,
        confidence: 0.95,
        reason: "Asks how to physically harm or kill a person",
        regulatory_framework: "EU AI Act Art. 5, EU DSA Art. 34",
        remediation: &["Refuse the request", "Provide crisis and safety resources"],
    },
    RuleSpec {
        id: "violence.threat",
        category: ViolationType::Violence,
        pattern: r"(?i)\bi(?:'m|\s+am|\s+will|\s+want|\s+plan|\s+intend)\s+(?:going\s+)?(?:to\s+)?(?:kill|murder|stab|shoot|poison|hurt)\b",
        description: "Stated intent to harm someone",
        severity: 9.0,
        confidence: 0.85,
        reason: "Expresses an intent to physically harm someone",
        regulatory_framework: "EU DSA Art. 34",
        remediation: &["Refuse to assist", "Provide crisis and safety resources"],
    },
    RuleSpec {
        id: "violence.mass_harm",
        category: ViolationType::Violence,
        pattern: r"(?i)\b(?:plan(?:ning)?\s+a\s+(?:mass|school)\s+shooting|bomb\s+(?:a|the)\s+(?:school|crowd|building|church|mosque|synagogue|temple|stadium))\b",
        description: "Planning of mass-casualty violence",
        severity: 10.0,
        confidence: 0.9,
        reason: "Describes planning an attack on many people",
        regulatory_framework: "EU AI Act Art. 5, EU Regulation 2021/784",
        remediation: &["Refuse the request", "Escalate to trust and safety immediately"],
    },
];

pub const COMPLIANCE_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "compliance.weapons",
        category: ViolationType::Compliance,
        pattern: r"(?i)\b(?:build|make|assemble|construct|3d[-\s]?print)\s+(?:a\s+|an\s+|my\s+own\s+)?(?:bomb|pipe\s+bomb|explosive|ghost\s+gun|untraceable\s+(?:gun|firearm)|silencer|suppressor|molotov(?:\s+cocktail)?)\b",
        description: "Request to manufacture a weapon or explosive",
        severity: 9.0,
        confidence: 0.9,
        reason: "Asks for help producing an illegal weapon",
        regulatory_framework: "US 18 U.S.C. 842, UK Explosive Substances Act 1883",
        remediation: &["Refuse the request"],
    },
    RuleSpec {
        id: "compliance.intrusion",
        category: ViolationType::Compliance,
        pattern: r"(?i)\b(?:hack|break)\s+into\s+(?:someone|somebody|my\s+\w+'?s?|his|her|their|a|an|the)\b",
        description: "Request for unauthorized computer access",
        severity: 8.0,
        confidence: 0.85,
        reason: "Asks how to access a system or account without authorization",
        regulatory_framework: "US CFAA, UK Computer Misuse Act 1990, EU Directive 2013/40",
        remediation: &["Refuse the request", "Offer guidance on securing one's own accounts instead"],
    },
    RuleSpec {
        id: "compliance.malware",
        category: ViolationType::Compliance,
        pattern: r"(?i)\b(?:write|create|build|deploy|develop|code)\s+(?:a\s+|some\s+|me\s+a\s+)?(?:ransomware|keylogger|malware|botnet|phishing\s+(?:kit|page|site|email))\b",
        description: "Request to create malicious software",
        severity: 8.5,
        confidence: 0.85,
        reason: "Asks for help producing malware or phishing material",
        regulatory_framework: "US CFAA, EU Directive 2013/40",
        remediation: &["Refuse the request"],
    },
    RuleSpec {
        id: "compliance.drugs",
        category: ViolationType::Compliance,
        pattern: r"(?i)\b(?:synthesi[sz]e|cook|make|manufacture|produce)\s+(?:meth|methamphetamine|fentanyl|heroin|cocaine|lsd)\b",
        description: "Request to manufacture controlled substances",
        severity: 8.5,
        confidence: 0.9,
        reason: "Asks how to produce an illegal drug",
        regulatory_framework: "US Controlled Substances Act, UN Single Convention 1961",
        remediation: &["Refuse the request", "Offer harm-reduction resources"],
    },
    RuleSpec {
        id: "compliance.fraud",
        category: ViolationType::Compliance,
        pattern: r"(?i)\b(?:launder\s+(?:money|cash|funds)|forge\s+(?:a\s+)?(?:passport|document|signature|check|cheque)|counterfeit\s+(?:money|bills|currency))\b",
        description: "Request to commit financial fraud or forgery",
        severity: 7.5,
        confidence: 0.8,
        reason: "Asks for help with laundering, forgery or counterfeiting",
        regulatory_framework: "EU AMLD, US Bank Secrecy Act",
        remediation: &["Refuse the request"],
    },
];

pub const MISINFORMATION_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "misinformation.health_claim",
        category: ViolationType::Misinformation,
        pattern: r"(?i)\b(?:vaccines?\s+causes?\s+autism|5g\s+(?:causes|spreads)\s+(?:covid|cancer|coronavirus)|(?:drinking\s+)?bleach\s+(?:cures?|kills\s+the\s+virus))\b",
        description: "Known health misinformation claim",
        severity: 6.0,
        confidence: 0.6,
        reason: "Repeats a health claim contradicted by scientific consensus",
        regulatory_framework: "EU DSA Art. 34, EU Code of Practice on Disinformation",
        remediation: &["Verify against authoritative health sources", "Attach a correction"],
    },
    RuleSpec {
        id: "misinformation.conspiracy",
        category: ViolationType::Misinformation,
        pattern: r"(?i)\b(?:the\s+earth\s+is\s+flat|moon\s+landings?\s+(?:was|were)\s+(?:faked|fake|staged)|climate\s+change\s+is\s+a\s+hoax)\b",
        description: "Known conspiracy claim",
        severity: 5.0,
        confidence: 0.55,
        reason: "Repeats a widely debunked conspiracy claim",
        regulatory_framework: "EU Code of Practice on Disinformation",
        remediation: &["Verify against authoritative sources"],
    },
    RuleSpec {
        id: "misinformation.absolute_claim",
        category: ViolationType::Misinformation,
        pattern: r"(?i)(?:\b100%\s+(?:proven|guaranteed|effective)|\bguaranteed\s+(?:cure|to\s+cure)|\bdoctors\s+don'?t\s+want\s+you\s+to\s+know)",
        description: "Unqualified absolute claim",
        severity: 4.5,
        confidence: 0.4,
        reason: "States an absolute claim that typically needs a source",
        regulatory_framework: "EU Unfair Commercial Practices Directive",
        remediation: &["Request a source for the claim"],
    },
];

/// A policy check producing zero or more violations.
///
/// Implementations must be pure: no randomness and no hidden state.
pub trait Detector: Send + Sync {
    /// Category used to decide whether this detector is enabled.
    fn category(&self) -> ViolationType;

    fn detect(&self, input: &str, output: &str) -> Vec<Violation>;
}

struct CompiledRule {
    spec: &'static RuleSpec,
    regex: Regex,
}

/// Detector backed by a static rule table.
pub struct RuleDetector {
    category: ViolationType,
    rules: Vec<CompiledRule>,
    max_text_chars: usize,
}

impl RuleDetector {
    /// Compile a rule table. All rules must belong to `category`.
    pub fn new(
        category: ViolationType,
        rules: &'static [RuleSpec],
        max_text_chars: usize,
    ) -> GovernanceResult<Self> {
        let rules = rules
            .iter()
            .map(|spec| {
                if spec.category != category {
                    return Err(GovernanceError::Invariant(format!(
                        "rule '{}' is {} but was registered under {}",
                        spec.id, spec.category, category
                    )));
                }
                let regex = Regex::new(spec.pattern).map_err(|e| {
                    GovernanceError::Invariant(format!("rule '{}' has invalid pattern: {}", spec.id, e))
                })?;
                Ok(CompiledRule { spec, regex })
            })
            .collect::<GovernanceResult<Vec<_>>>()?;

        Ok(Self {
            category,
            rules,
            max_text_chars,
        })
    }

    fn scan(&self, source: TextSource, text: &str, violations: &mut Vec<Violation>) {
        if text.is_empty() {
            return;
        }
        if text.chars().count() > self.max_text_chars {
            tracing::debug!(
                category = %self.category,
                source = %source,
                "Text exceeds detector limit, skipping"
            );
            return;
        }

        for rule in &self.rules {
            let mut matches = rule.regex.find_iter(text);
            let Some(first) = matches.next() else {
                continue;
            };
            let count = 1 + matches.count();
            let spec = rule.spec;

            violations.push(Violation {
                id: Violation::content_id(spec.id, source, first.start(), first.end()),
                violation_type: spec.category,
                description: spec.description.to_string(),
                severity: spec.severity,
                confidence: spec.confidence,
                reason: format!("{} ({} match(es) in {})", spec.reason, count, source),
                regulatory_framework: spec.regulatory_framework.to_string(),
                compliance_level: SeverityLevel::from_score(spec.severity),
                remediation_steps: spec.remediation.iter().map(|s| s.to_string()).collect(),
                rule_id: spec.id.to_string(),
                source,
            });
        }
    }
}

impl Detector for RuleDetector {
    fn category(&self) -> ViolationType {
        self.category
    }

    fn detect(&self, input: &str, output: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        self.scan(TextSource::Input, input, &mut violations);
        self.scan(TextSource::Output, output, &mut violations);
        violations
    }
}

/// The pluggable collection of detectors run by the Policy Enforcer.
pub struct DetectorSet {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorSet {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// The built-in rule detectors, one per toggleable category.
    pub fn builtin(max_text_chars: usize) -> GovernanceResult<Self> {
        let tables: [(ViolationType, &'static [RuleSpec]); 6] = [
            (ViolationType::Pii, PII_RULES),
            (ViolationType::Bias, BIAS_RULES),
            (ViolationType::HateSpeech, HATE_SPEECH_RULES),
            (ViolationType::Violence, VIOLENCE_RULES),
            (ViolationType::Compliance, COMPLIANCE_RULES),
            (ViolationType::Misinformation, MISINFORMATION_RULES),
        ];

        let mut detectors: Vec<Box<dyn Detector>> = Vec::with_capacity(tables.len());
        for (category, rules) in tables {
            detectors.push(Box::new(RuleDetector::new(category, rules, max_text_chars)?));
        }
        Ok(Self::new(detectors))
    }

    /// Add a custom detector.
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Run every enabled detector and return the union of their violations.
    ///
    /// A panicking detector is a programming error and fails the run.
    pub fn run(
        &self,
        input: &str,
        output: &str,
        toggles: &DetectorToggles,
    ) -> GovernanceResult<Vec<Violation>> {
        let mut violations = Vec::new();

        for detector in &self.detectors {
            let category = detector.category();
            if !toggles.is_enabled(category) {
                continue;
            }

            let found = catch_unwind(AssertUnwindSafe(|| detector.detect(input, output)))
                .map_err(|_| {
                    GovernanceError::Invariant(format!("{} detector panicked", category))
                })?;

            if !found.is_empty() {
                tracing::debug!(
                    category = %category,
                    count = found.len(),
                    "Detector reported violations"
                );
            }
            violations.extend(found);
        }

        Ok(violations)
    }
}
