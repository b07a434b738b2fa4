//! Chi-squared combining classifier (Robinson's scheme, chi-combining).
//!
//! Each token gets a spam probability from its training counts, pulled
//! toward a prior by Robinson's Bayesian adjustment. The most extreme
//! probabilities are then combined twice with Fisher's method: `-2 ln Π p`
//! and `-2 ln Π (1-p)` are chi-squared with `2n` degrees of freedom when the
//! probabilities are uniform noise. The ham and spam significances are folded
//! into a single score in \[0, 1\].
//!
//! Many strong ham clues together with many strong spam clues score near 0.5
//! rather than near certainty, which keeps the mistakes in a narrow "unsure"
//! band.

use std::cmp::Ordering;
use std::f64::consts::LN_2;

use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::stats::chi_squared_upper_tail;
use crate::store::{GlobalCounts, TokenCounts, TokenStore, token_set};

/// Result type for classifier operations.
pub type ClassifierResult<T> = std::result::Result<T, ClassifierError>;

/// Running products are renormalized once they fall below this.
const UNDERFLOW_GUARD: f64 = 1e-200;

// ── Clue / Evidence ────────────────────────────────────────────────────────

/// A token and its spam probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clue {
    pub token: String,
    pub probability: f64,
}

impl Clue {
    /// Strength of the clue: distance from the neutral 0.5.
    pub fn distance(&self) -> f64 {
        (self.probability - 0.5).abs()
    }
}

/// Why a message scored the way it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Significance of the ham evidence, `1 - chi2Q(-2 ln Π p, 2n)`.
    pub ham_statistic: f64,
    /// Significance of the spam evidence, `1 - chi2Q(-2 ln Π (1-p), 2n)`.
    pub spam_statistic: f64,
    /// Discriminators used, by ascending probability.
    pub clues: Vec<Clue>,
}

impl Evidence {
    /// Pseudo-token labelling the ham statistic.
    pub const HAM_LABEL: &'static str = "*H*";
    /// Pseudo-token labelling the spam statistic.
    pub const SPAM_LABEL: &'static str = "*S*";

    /// Flat `(token, value)` listing: `*H*`, `*S*`, then every clue.
    pub fn entries(&self) -> Vec<(&str, f64)> {
        let mut entries = Vec::with_capacity(self.clues.len() + 2);
        entries.push((Self::HAM_LABEL, self.ham_statistic));
        entries.push((Self::SPAM_LABEL, self.spam_statistic));
        entries.extend(
            self.clues
                .iter()
                .map(|clue| (clue.token.as_str(), clue.probability)),
        );
        entries
    }
}

// ── Verdict ────────────────────────────────────────────────────────────────

/// Three-way decision derived from a score and the configured cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Ham,
    Unsure,
    Spam,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ham => write!(f, "ham"),
            Self::Unsure => write!(f, "unsure"),
            Self::Spam => write!(f, "spam"),
        }
    }
}

// ── ScaledProduct ──────────────────────────────────────────────────────────

/// A product of probabilities with unbounded dynamic range.
///
/// The true value is `mantissa * 2^exponent`. Multiplying stays in plain f64
/// until the mantissa drops below [`UNDERFLOW_GUARD`], at which point it is
/// renormalized into \[0.5, 1) and the binary exponent is carried separately.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScaledProduct {
    mantissa: f64,
    exponent: i32,
}

impl ScaledProduct {
    fn one() -> Self {
        Self {
            mantissa: 1.0,
            exponent: 0,
        }
    }

    fn mul(&mut self, factor: f64) {
        self.mantissa *= factor;
        if self.mantissa < UNDERFLOW_GUARD {
            let (mantissa, exponent) = frexp(self.mantissa);
            self.mantissa = mantissa;
            self.exponent += exponent;
        }
    }

    /// Natural log of the true value: `ln(m) + e * ln 2`.
    fn ln(&self) -> f64 {
        self.mantissa.ln() + f64::from(self.exponent) * LN_2
    }
}

/// Split a finite non-zero `x` into `m * 2^e` with `|m|` in \[0.5, 1).
///
/// Zero, infinities and NaN come back unchanged with exponent 0.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // Subnormal: scale into the normal range first.
        let (m, e) = frexp(x * 2f64.powi(54));
        return (m, e - 54);
    }
    let mantissa = f64::from_bits((bits & !(0x7ff_u64 << 52)) | (1022_u64 << 52));
    (mantissa, biased - 1022)
}

// ── Classifier ─────────────────────────────────────────────────────────────

/// Spam classifier over a [`TokenStore`].
///
/// Holds nothing but its configuration and a store handle, so a classifier
/// over a `Sync` store can be shared across threads. Training goes through
/// the store; the classifier never touches counts directly.
#[derive(Debug)]
pub struct Classifier<S> {
    store: S,
    config: ClassifierConfig,
}

impl<S: TokenStore> Classifier<S> {
    /// Classifier with the default tuning.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: ClassifierConfig::default(),
        }
    }

    /// Classifier with explicit tuning; the config is validated first.
    pub fn with_config(store: S, config: ClassifierConfig) -> ClassifierResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Spam probability of a token seen in `spam` spam and `ham` ham messages.
    ///
    /// Reads the current message totals from the store. Fails with
    /// [`ClassifierError::CountInvariant`] if the counts exceed the totals.
    pub fn probability(&self, spam: u64, ham: u64) -> ClassifierResult<f64> {
        let globals = self.store.global_counts()?;
        self.adjusted_probability(TokenCounts::new(spam, ham), globals)
    }

    fn adjusted_probability(&self, counts: TokenCounts, globals: GlobalCounts) -> ClassifierResult<f64> {
        let nspam = globals.nspam.max(1);
        let nham = globals.nham.max(1);
        if counts.ham > nham || counts.spam > nspam {
            return Err(ClassifierError::CountInvariant {
                spam: counts.spam,
                ham: counts.ham,
                nspam: globals.nspam,
                nham: globals.nham,
            });
        }

        let n = counts.total();
        if n == 0 {
            return Ok(self.config.unknown_token_prob);
        }

        let spam_ratio = counts.spam as f64 / nspam as f64;
        let ham_ratio = counts.ham as f64 / nham as f64;
        let p = spam_ratio / (ham_ratio + spam_ratio);

        // Robinson's adjustment:
        //
        //         s*x + n*p
        //  f  =  -----------
        //           s + n
        //
        // moves p toward the prior x, less so the more evidence n there is.
        let s = self.config.unknown_token_strength;
        let x = self.config.unknown_token_prob;
        let n = n as f64;
        Ok((s * x + n * p) / (s + n))
    }

    /// The discriminators of a message, strongest first.
    ///
    /// Duplicates are collapsed and the totals and token counts come from one
    /// store snapshot. Tokens closer to 0.5 than `minimum_prob_strength` are
    /// dropped and at most `max_discriminators` clues are kept. Ties in strength are
    /// broken by probability, then by token.
    pub fn clues<I, T>(&self, tokens: I) -> ClassifierResult<Vec<Clue>>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let tokens = token_set(tokens);
        let (globals, counts) = self.store.counts_snapshot(&tokens)?;

        let mut clues = Vec::with_capacity(tokens.len());
        for token in tokens {
            let probability = match counts.get(&token) {
                Some(&c) => self.adjusted_probability(c, globals)?,
                None => self.config.unknown_token_prob,
            };
            let clue = Clue { token, probability };
            if clue.distance() >= self.config.minimum_prob_strength {
                clues.push(clue);
            }
        }

        clues.sort_by(strongest_first);
        clues.truncate(self.config.max_discriminators);
        Ok(clues)
    }

    /// Probability in \[0, 1\] that the message is spam; 0.5 with no clues.
    pub fn spam_probability<I, T>(&self, tokens: I) -> ClassifierResult<f64>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let clues = self.clues(tokens)?;
        let (score, _, _) = combine(&clues)?;
        Ok(score)
    }

    /// Like [`Classifier::spam_probability`], also returning the evidence.
    pub fn spam_probability_with_evidence<I, T>(&self, tokens: I) -> ClassifierResult<(f64, Evidence)>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut clues = self.clues(tokens)?;
        let (score, ham_statistic, spam_statistic) = combine(&clues)?;
        clues.sort_by(|a, b| {
            a.probability
                .total_cmp(&b.probability)
                .then_with(|| a.token.cmp(&b.token))
        });
        Ok((
            score,
            Evidence {
                ham_statistic,
                spam_statistic,
                clues,
            },
        ))
    }

    /// Score the message and map it through the configured cutoffs.
    pub fn classify<I, T>(&self, tokens: I) -> ClassifierResult<Verdict>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Ok(self.verdict(self.spam_probability(tokens)?))
    }

    /// `Ham` below `ham_cutoff`, `Spam` above `spam_cutoff`, else `Unsure`.
    pub fn verdict(&self, score: f64) -> Verdict {
        if score < self.config.ham_cutoff {
            Verdict::Ham
        } else if score > self.config.spam_cutoff {
            Verdict::Spam
        } else {
            Verdict::Unsure
        }
    }

    // Training counts a token once per message, however often it occurs:
    // under Robinson's scheme counting repeats only biases the probabilities.

    /// Train one spam message.
    pub fn add_spam<I, T>(&self, tokens: I) -> ClassifierResult<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Ok(self.store.add_spam(&token_set(tokens))?)
    }

    /// Train one ham message.
    pub fn add_ham<I, T>(&self, tokens: I) -> ClassifierResult<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Ok(self.store.add_ham(&token_set(tokens))?)
    }

    /// Retract a spam message trained earlier.
    pub fn remove_spam<I, T>(&self, tokens: I) -> ClassifierResult<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Ok(self.store.remove_spam(&token_set(tokens))?)
    }

    /// Retract a ham message trained earlier.
    pub fn remove_ham<I, T>(&self, tokens: I) -> ClassifierResult<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Ok(self.store.remove_ham(&token_set(tokens))?)
    }
}

fn strongest_first(a: &Clue, b: &Clue) -> Ordering {
    b.distance()
        .total_cmp(&a.distance())
        .then_with(|| a.probability.total_cmp(&b.probability))
        .then_with(|| a.token.cmp(&b.token))
}

/// Fold clues into `(score, ham_statistic, spam_statistic)`.
///
/// The spam measure multiplies `1-p` and the ham measure `p`: the
/// sum-of-logs test is most sensitive to values near zero, so each side is
/// driven by the clues pointing its way.
fn combine(clues: &[Clue]) -> ClassifierResult<(f64, f64, f64)> {
    if clues.is_empty() {
        return Ok((0.5, 0.0, 0.0));
    }

    let mut h = ScaledProduct::one();
    let mut s = ScaledProduct::one();
    for clue in clues {
        s.mul(1.0 - clue.probability);
        h.mul(clue.probability);
    }

    let dof = u32::try_from(clues.len().saturating_mul(2)).unwrap_or(u32::MAX - 1);
    let spam_statistic = 1.0 - chi_squared_upper_tail(-2.0 * s.ln(), dof)?;
    let ham_statistic = 1.0 - chi_squared_upper_tail(-2.0 * h.ln(), dof)?;

    // S - H scaled into [0, 1]. S/(S+H) would be near-certain whenever H is
    // tiny, even if S is small too.
    let score = (spam_statistic - ham_statistic + 1.0) / 2.0;
    tracing::debug!(clues = clues.len(), score, ham_statistic, spam_statistic, "combined clues");
    Ok((score, ham_statistic, spam_statistic))
}
