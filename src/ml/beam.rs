// ============================================================
// Layer 5 — Beam Search
// ============================================================
// Backend-independent beam search over a step function that maps
// the current hypotheses to next-token log-probabilities.
//
//   alive beams ──step_fn──▶ log-probs [beams][vocab]
//        ▲                         │ expand top 2·num_beams per beam
//        │                         ▼
//        └──── best num_beams non-EOS ◀── sort all candidates
//                                  └─ EOS candidates → finished
//
// Hypotheses are ranked by score / generated_len^length_penalty.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::ml::backbone::GenerationConfig;

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    score:  f32,
}

impl Hypothesis {
    fn normalized(&self, length_penalty: f32) -> f32 {
        // first token is the decoder start token
        let generated = (self.tokens.len().saturating_sub(1)).max(1) as f32;
        self.score / generated.powf(length_penalty)
    }
}

/// Tokens that would repeat an n-gram already present in `tokens`.
fn banned_tokens(tokens: &[u32], n: usize) -> HashSet<u32> {
    let mut banned = HashSet::new();
    if n == 0 || tokens.len() + 1 < n {
        return banned;
    }
    let prefix = &tokens[tokens.len() + 1 - n..];
    for window in tokens.windows(n) {
        if window[..n - 1] == *prefix {
            banned.insert(window[n - 1]);
        }
    }
    banned
}

fn by_score_desc(a: &f32, b: &f32) -> Ordering {
    b.partial_cmp(a).unwrap_or(Ordering::Equal)
}

/// Run beam search from `start_token`.
///
/// `step_fn` receives every alive hypothesis (all of equal length)
/// and returns one log-probability row per hypothesis. Exactly
/// `config.num_return_sequences` sequences are returned, best first.
pub fn beam_search<F>(
    config:      &GenerationConfig,
    start_token: u32,
    eos_token:   u32,
    mut step_fn: F,
) -> Vec<Vec<u32>>
where
    F: FnMut(&[Vec<u32>]) -> Vec<Vec<f32>>,
{
    let num_beams = config.num_beams.max(config.num_return_sequences).max(1);
    let mut alive    = vec![Hypothesis { tokens: vec![start_token], score: 0.0 }];
    let mut finished: Vec<Hypothesis> = Vec::new();

    for _ in 0..config.max_new_tokens {
        let prefixes: Vec<Vec<u32>> = alive.iter().map(|h| h.tokens.clone()).collect();
        let log_probs = step_fn(&prefixes);

        // (score, beam, token)
        let mut candidates: Vec<(f32, usize, u32)> = Vec::new();
        for (beam, (hyp, row)) in alive.iter().zip(&log_probs).enumerate() {
            let banned = banned_tokens(&hyp.tokens, config.no_repeat_ngram_size);
            let mut scored: Vec<(f32, u32)> = row
                .iter()
                .enumerate()
                .filter(|(tok, lp)| lp.is_finite() && !banned.contains(&(*tok as u32)))
                .map(|(tok, &lp)| (hyp.score + lp, tok as u32))
                .collect();

            let keep = (2 * num_beams).min(scored.len());
            if keep < scored.len() {
                scored.select_nth_unstable_by(keep, |a, b| by_score_desc(&a.0, &b.0));
                scored.truncate(keep);
            }
            candidates.extend(scored.into_iter().map(|(s, t)| (s, beam, t)));
        }
        candidates.sort_by(|a, b| by_score_desc(&a.0, &b.0));

        let mut next = Vec::with_capacity(num_beams);
        for (score, beam, token) in candidates {
            let mut tokens = alive[beam].tokens.clone();
            tokens.push(token);
            let hyp = Hypothesis { tokens, score };

            if token == eos_token {
                finished.push(hyp);
            } else {
                next.push(hyp);
            }
            if next.len() == num_beams {
                break;
            }
        }

        alive = next;
        if alive.is_empty() || (config.early_stopping && finished.len() >= num_beams) {
            break;
        }
    }

    // unfinished beams compete with finished ones at max length
    finished.extend(alive);
    finished.sort_by(|a, b| {
        by_score_desc(&a.normalized(config.length_penalty), &b.normalized(config.length_penalty))
    });

    let mut out: Vec<Vec<u32>> = finished
        .into_iter()
        .take(config.num_return_sequences)
        .map(|h| h.tokens)
        .collect();

    // tiny vocabularies can yield fewer distinct hypotheses
    while out.len() < config.num_return_sequences {
        let filler = out.last().cloned().unwrap_or_else(|| vec![start_token, eos_token]);
        out.push(filler);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EOS: u32 = 1;

    fn config(beams: usize, returns: usize, max_new: usize) -> GenerationConfig {
        GenerationConfig {
            num_return_sequences: returns,
            num_beams:            beams,
            max_new_tokens:       max_new,
            no_repeat_ngram_size: 0,
            early_stopping:       true,
            length_penalty:       1.0,
        }
    }

    /// Vocabulary of 4: prefers token 2, then EOS once two tokens exist.
    fn scripted(prefixes: &[Vec<u32>]) -> Vec<Vec<f32>> {
        prefixes
            .iter()
            .map(|p| {
                let probs: [f32; 4] = if p.len() >= 3 {
                    [0.01, 0.9, 0.05, 0.04]
                } else {
                    [0.01, 0.04, 0.8, 0.15]
                };
                probs.iter().map(|p| p.ln()).collect()
            })
            .collect()
    }

    #[test]
    fn test_returns_exact_count_best_first() {
        let out = beam_search(&config(4, 3, 10), 0, EOS, scripted);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], vec![0, 2, 2, EOS]);
        assert!(out.iter().all(|s| s[0] == 0));
    }

    #[test]
    fn test_max_new_tokens_bounds_length() {
        let never_eos = |p: &[Vec<u32>]| -> Vec<Vec<f32>> {
            p.iter().map(|_| vec![f32::NEG_INFINITY, f32::NEG_INFINITY, 0.0, -1.0]).collect()
        };
        let out = beam_search(&config(2, 2, 5), 0, EOS, never_eos);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.len() == 6));
        assert_eq!(out[0], vec![0, 2, 2, 2, 2, 2]);
    }

    #[test]
    fn test_pads_when_vocab_is_too_small() {
        let only_eos = |p: &[Vec<u32>]| -> Vec<Vec<f32>> {
            p.iter().map(|_| vec![f32::NEG_INFINITY, 0.0]).collect()
        };
        let out = beam_search(&config(30, 10, 50), 0, EOS, only_eos);
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|s| *s == vec![0, EOS]));
    }

    #[test]
    fn test_no_repeat_ngram_bans_repeats() {
        assert_eq!(banned_tokens(&[0, 5, 6, 5], 2), HashSet::from([6]));
        assert!(banned_tokens(&[0, 5, 6], 0).is_empty());

        let mut cfg = config(1, 1, 4);
        cfg.no_repeat_ngram_size = 1;
        let flat = |p: &[Vec<u32>]| -> Vec<Vec<f32>> {
            p.iter().map(|_| vec![-5.0, -9.0, -0.1, -0.2, -0.3]).collect()
        };
        let out = beam_search(&cfg, 0, EOS, flat);
        assert_eq!(out[0], vec![0, 2, 3, 4, 1]);
    }
}
