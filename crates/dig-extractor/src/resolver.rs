//! Concept resolution
//!
//! Mentions are grouped by normalized key first. Groups whose keys are
//! similar enough, and which appear in nearby passages, are then merged
//! greedily in descending similarity order. A group joins a cluster only if
//! it is similar to every member already there, and a group that has been
//! placed is never moved.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use dig_core::text::{display_form, normalize_term};
use dig_core::{Concept, ConceptId, ConceptKind, Mention, PassageId, ResolverConfig};

// ============================================================================
// Output Types
// ============================================================================

/// Where a resolved concept was mentioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub passage_id: PassageId,
    pub start: usize,
    pub end: usize,
}

/// Canonical concepts of one document plus where each was mentioned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConcepts {
    /// Sorted by concept id
    pub concepts: Vec<Concept>,
    pub occurrences: BTreeMap<ConceptId, Vec<Occurrence>>,
}

impl ResolvedConcepts {
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn get(&self, id: &ConceptId) -> Option<&Concept> {
        self.concepts
            .binary_search_by(|c| c.id.cmp(id))
            .ok()
            .map(|i| &self.concepts[i])
    }

    /// Find a concept by label or alias (normalized comparison)
    pub fn find_by_label(&self, label: &str) -> Option<&Concept> {
        let key = normalize_term(label);
        self.concepts.iter().find(|c| {
            normalize_term(&c.label) == key || c.aliases.iter().any(|a| normalize_term(a) == key)
        })
    }

    /// Keep at most `max` concepts, spread across kinds
    ///
    /// Each kind present gets an equal share of the slots, filled by
    /// salience; slots a kind cannot use go to the most salient of the rest.
    pub fn select_diverse(mut self, max: usize) -> Self {
        if self.concepts.len() <= max {
            return self;
        }

        let by_rank = |a: &&Concept, b: &&Concept| {
            b.salience
                .total_cmp(&a.salience)
                .then(b.mention_count.cmp(&a.mention_count))
                .then(a.id.cmp(&b.id))
        };

        let mut by_kind: BTreeMap<ConceptKind, Vec<&Concept>> = BTreeMap::new();
        for concept in &self.concepts {
            by_kind.entry(concept.kind).or_default().push(concept);
        }
        let quota = max / by_kind.len().max(1);

        let mut keep: BTreeSet<ConceptId> = BTreeSet::new();
        for group in by_kind.values_mut() {
            group.sort_by(by_rank);
            keep.extend(group.iter().take(quota).map(|c| c.id));
        }
        let mut rest: Vec<&Concept> = self
            .concepts
            .iter()
            .filter(|c| !keep.contains(&c.id))
            .collect();
        rest.sort_by(by_rank);
        let room = max.saturating_sub(keep.len());
        keep.extend(rest.iter().take(room).map(|c| c.id));

        let before = self.concepts.len();
        self.concepts.retain(|c| keep.contains(&c.id));
        self.occurrences.retain(|id, _| keep.contains(id));

        tracing::debug!(
            kept = self.concepts.len(),
            dropped = before - self.concepts.len(),
            "Capped concepts"
        );
        self
    }

    /// Occurrences grouped by passage, ordered by position
    pub fn by_passage(&self) -> BTreeMap<PassageId, Vec<(ConceptId, Occurrence)>> {
        let mut map: BTreeMap<PassageId, Vec<(ConceptId, Occurrence)>> = BTreeMap::new();
        for (id, occurrences) in &self.occurrences {
            for occ in occurrences {
                map.entry(occ.passage_id).or_default().push((*id, *occ));
            }
        }
        for list in map.values_mut() {
            list.sort_by_key(|(id, occ)| (occ.start, occ.end, *id));
        }
        map
    }
}

// ============================================================================
// Canonical label selection
// ============================================================================

/// Usage statistics of one surface form within a merged concept
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceForm {
    pub text: String,
    pub count: u32,
    pub total_salience: f32,
}

/// Pick the canonical label among merged surface forms
///
/// Most frequent first, then highest total salience, then the shortest form,
/// then lexicographic order.
pub fn canonical_label(forms: &[SurfaceForm]) -> Option<&str> {
    forms
        .iter()
        .min_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.total_salience.total_cmp(&a.total_salience))
                .then(a.text.chars().count().cmp(&b.text.chars().count()))
                .then(a.text.cmp(&b.text))
        })
        .map(|f| f.text.as_str())
}

// ============================================================================
// Similarity
// ============================================================================

/// Levenshtein distance over chars
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Surface similarity of two normalized keys in [0, 1]
///
/// The larger of the edit-distance ratio and the token Jaccard overlap.
pub fn similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let longest = a.chars().count().max(b.chars().count());
    let edit = if longest == 0 {
        0.0
    } else {
        1.0 - edit_distance(a, b) as f32 / longest as f32
    };

    let ta: HashSet<&str> = a.split(' ').collect();
    let tb: HashSet<&str> = b.split(' ').collect();
    let union = ta.union(&tb).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        ta.intersection(&tb).count() as f32 / union as f32
    };

    edit.max(jaccard)
}

// ============================================================================
// Concept Resolver
// ============================================================================

#[derive(Debug, Default)]
struct TermGroup<'a> {
    mentions: Vec<&'a Mention>,
    passages: BTreeSet<PassageId>,
}

/// Whole-document concept resolver
#[derive(Debug, Clone)]
pub struct ConceptResolver {
    config: ResolverConfig,
}

impl ConceptResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    fn within_window(&self, a: &BTreeSet<PassageId>, b: &BTreeSet<PassageId>) -> bool {
        let window = self.config.context_window;
        a.iter().any(|pa| {
            let lo = PassageId(pa.0.saturating_sub(window));
            let hi = PassageId(pa.0.saturating_add(window));
            b.range(lo..=hi).next().is_some()
        })
    }

    /// Resolve all mentions of one document into canonical concepts
    pub fn resolve(&self, mentions: &[Mention]) -> ResolvedConcepts {
        // Exact normalized-key groups
        let mut groups: BTreeMap<String, TermGroup> = BTreeMap::new();
        for mention in mentions {
            let key = normalize_term(&mention.surface);
            if key.is_empty() {
                continue;
            }
            let group = groups.entry(key).or_default();
            group.mentions.push(mention);
            group.passages.insert(mention.passage_id);
        }

        let keys: Vec<&String> = groups.keys().collect();

        // Candidate merges, strongest first
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                let sim = similarity(keys[i], keys[j]);
                if sim > self.config.similarity_threshold
                    && self.within_window(&groups[keys[i]].passages, &groups[keys[j]].passages)
                {
                    pairs.push((sim, i, j));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        // Greedy complete-link clustering; assignments are final
        let mut cluster_of: HashMap<usize, usize> = HashMap::new();
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for (_, i, j) in pairs {
            match (cluster_of.get(&i).copied(), cluster_of.get(&j).copied()) {
                (None, None) => {
                    cluster_of.insert(i, clusters.len());
                    cluster_of.insert(j, clusters.len());
                    clusters.push(vec![i, j]);
                }
                (Some(c), None) | (None, Some(c)) => {
                    let newcomer = if cluster_of.contains_key(&i) { j } else { i };
                    let fits = clusters[c].iter().all(|m| {
                        similarity(keys[*m], keys[newcomer]) > self.config.similarity_threshold
                    });
                    if fits {
                        cluster_of.insert(newcomer, c);
                        clusters[c].push(newcomer);
                    }
                }
                (Some(_), Some(_)) => {}
            }
        }
        for i in 0..keys.len() {
            if !cluster_of.contains_key(&i) {
                cluster_of.insert(i, clusters.len());
                clusters.push(vec![i]);
            }
        }

        let mut resolved = ResolvedConcepts::default();
        for members in clusters {
            let cluster_mentions: Vec<&Mention> = members
                .iter()
                .flat_map(|m| groups[keys[*m]].mentions.iter().copied())
                .collect();

            let mut forms: BTreeMap<String, SurfaceForm> = BTreeMap::new();
            for mention in &cluster_mentions {
                let text = display_form(&mention.surface);
                let form = forms.entry(text.clone()).or_insert(SurfaceForm {
                    text,
                    count: 0,
                    total_salience: 0.0,
                });
                form.count += 1;
                form.total_salience += mention.salience;
            }
            let forms: Vec<SurfaceForm> = forms.into_values().collect();
            let Some(label) = canonical_label(&forms) else {
                continue;
            };

            let mut concept = Concept::new(label);
            let mut occurrences = Vec::with_capacity(cluster_mentions.len());
            for mention in &cluster_mentions {
                concept.absorb(mention);
                occurrences.push(Occurrence {
                    passage_id: mention.passage_id,
                    start: mention.start,
                    end: mention.end,
                });
            }
            occurrences.sort();

            if members.len() > 1 {
                tracing::debug!(
                    label = %concept.label,
                    merged_keys = members.len(),
                    "Merged near-duplicate surface forms"
                );
            }

            resolved.occurrences.insert(concept.id, occurrences);
            resolved.concepts.push(concept);
        }

        resolved.concepts.sort_by(|a, b| a.id.cmp(&b.id));
        let resolved = resolved.select_diverse(self.config.max_concepts.max(1));

        tracing::debug!(
            mentions = mentions.len(),
            concepts = resolved.concepts.len(),
            "Resolved concepts"
        );

        resolved
    }
}

impl Default for ConceptResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mention(surface: &str, passage: u32, salience: f32) -> Mention {
        Mention {
            surface: surface.to_string(),
            passage_id: PassageId(passage),
            start: 0,
            end: surface.len(),
            salience,
            kind: ConceptKind::General,
        }
    }

    fn form(text: &str, count: u32, total_salience: f32) -> SurfaceForm {
        SurfaceForm {
            text: text.to_string(),
            count,
            total_salience,
        }
    }

    #[test]
    fn test_canonical_label_tie_breaks() {
        // Frequency wins
        assert_eq!(
            canonical_label(&[form("neural net", 1, 0.9), form("neural network", 3, 0.5)]),
            Some("neural network")
        );
        // Then total salience
        assert_eq!(
            canonical_label(&[form("svm", 2, 0.4), form("support vector machine", 2, 0.8)]),
            Some("support vector machine")
        );
        // Then the shortest form
        assert_eq!(
            canonical_label(&[form("markov chains", 2, 0.5), form("markov chain", 2, 0.5)]),
            Some("markov chain")
        );
        // Then lexicographic order
        assert_eq!(
            canonical_label(&[form("beta", 1, 0.5), form("alfa", 1, 0.5)]),
            Some("alfa")
        );
        assert_eq!(canonical_label(&[]), None);
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("neural network", "neural network"), 1.0);
        assert!(similarity("neural network", "neural networks") > 0.9);
        assert!(similarity("gradient descent", "neural network") < 0.5);
    }

    #[test]
    fn test_case_and_diacritic_variants_merge() {
        let resolver = ConceptResolver::default();
        let resolved = resolver.resolve(&[
            mention("Naïve Bayes", 0, 0.5),
            mention("naive bayes", 7, 0.5),
            mention("NAIVE BAYES", 20, 0.2),
        ]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.concepts[0].mention_count, 3);
        assert_eq!(resolved.concepts[0].salience, 1.0);
    }

    #[test]
    fn test_similar_forms_merge_only_in_shared_context() {
        let resolver = ConceptResolver::default();

        let nearby = resolver.resolve(&[
            mention("neural network", 0, 0.6),
            mention("neural networks", 1, 0.4),
        ]);
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby.concepts[0].label, "neural network");
        assert_eq!(nearby.concepts[0].aliases.len(), 2);

        let far_apart = resolver.resolve(&[
            mention("neural network", 0, 0.6),
            mention("neural networks", 9, 0.4),
        ]);
        assert_eq!(far_apart.len(), 2);
    }

    #[test]
    fn test_partial_token_overlap_stays_separate() {
        let resolver = ConceptResolver::default();
        let resolved = resolver.resolve(&[
            mention("markov chain", 0, 0.5),
            mention("markov chains", 0, 0.5),
            mention("markov chains model", 0, 0.5),
        ]);
        assert_eq!(resolved.len(), 2);
        let merged = resolved.find_by_label("markov chains").unwrap();
        assert_eq!(merged.mention_count, 2);
    }

    #[test]
    fn test_cluster_members_must_all_be_similar() {
        // "ab cd" ~ "ab ce" ~ "ab cf", but "xb cf" only resembles "ab cf"
        let resolver = ConceptResolver::new(ResolverConfig {
            similarity_threshold: 0.75,
            context_window: 1,
            ..Default::default()
        });
        let resolved = resolver.resolve(&[
            mention("ab cd", 0, 0.5),
            mention("ab ce", 0, 0.5),
            mention("ab cf", 0, 0.5),
            mention("xb cf", 0, 0.5),
        ]);
        assert_eq!(resolved.len(), 2);
        let big = resolved.find_by_label("ab cd").unwrap();
        assert_eq!(big.mention_count, 3);
        let alone = resolved.find_by_label("xb cf").unwrap();
        assert_eq!(alone.mention_count, 1);
    }

    #[test]
    fn test_similarity_must_exceed_threshold() {
        let mentions = [mention("ab cd", 0, 0.5), mention("ab ce", 0, 0.5)];
        let sim = similarity("ab cd", "ab ce");

        let at = ConceptResolver::new(ResolverConfig {
            similarity_threshold: sim,
            context_window: 1,
            ..Default::default()
        });
        assert_eq!(at.resolve(&mentions).len(), 2);

        let below = ConceptResolver::new(ResolverConfig {
            similarity_threshold: sim - 0.01,
            context_window: 1,
            ..Default::default()
        });
        assert_eq!(below.resolve(&mentions).len(), 1);
    }

    #[test]
    fn test_concept_cap_spreads_across_kinds() {
        let mut mentions = Vec::new();
        for (i, label) in ["alpha", "beta", "gamma", "delta"].iter().enumerate() {
            mentions.push(mention(label, 0, 0.9 - i as f32 * 0.1));
        }
        let mut theory = mention("bayes theorem", 0, 0.1);
        theory.kind = ConceptKind::Theory;
        mentions.push(theory);
        let mut method = mention("gradient descent", 0, 0.05);
        method.kind = ConceptKind::Method;
        mentions.push(method);

        let resolver = ConceptResolver::new(ResolverConfig {
            max_concepts: 4,
            ..Default::default()
        });
        let resolved = resolver.resolve(&mentions);
        assert_eq!(resolved.len(), 4);
        assert_eq!(resolved.occurrences.len(), 4);

        let mut labels: Vec<&str> = resolved.concepts.iter().map(|c| c.label.as_str()).collect();
        labels.sort();
        // One slot per kind, then the most salient of the rest
        assert_eq!(labels, vec!["alpha", "bayes theorem", "beta", "gradient descent"]);

        let uncapped = ConceptResolver::default().resolve(&mentions);
        assert_eq!(uncapped.len(), 6);
    }

    #[test]
    fn test_by_passage_is_ordered() {
        let resolver = ConceptResolver::default();
        let mut a = mention("gradient descent", 0, 0.5);
        a.start = 30;
        a.end = 46;
        let b = mention("loss function", 0, 0.5);
        let resolved = resolver.resolve(&[a, b]);
        let by_passage = resolved.by_passage();
        let first = &by_passage[&PassageId(0)];
        assert_eq!(first.len(), 2);
        assert!(first[0].1.start < first[1].1.start);
    }

    #[test]
    fn test_empty_input_is_valid() {
        let resolved = ConceptResolver::default().resolve(&[]);
        assert!(resolved.is_empty());
    }

    proptest! {
        #[test]
        fn prop_alias_sets_are_disjoint(
            surfaces in proptest::collection::vec(
                proptest::sample::select(vec![
                    "neural network", "Neural Networks", "neural net", "gradient descent",
                    "Gradient-Descent", "loss function", "loss functions", "CNN", "cnn layer",
                ]),
                0..40,
            ),
            passages in proptest::collection::vec(0u32..6, 40),
        ) {
            let mentions: Vec<Mention> = surfaces
                .iter()
                .zip(passages.iter())
                .map(|(s, p)| mention(s, *p, 0.3))
                .collect();
            let resolved = ConceptResolver::default().resolve(&mentions);

            let mut seen: HashSet<String> = HashSet::new();
            for concept in &resolved.concepts {
                let keys: HashSet<String> = concept.aliases.iter().map(|a| normalize_term(a)).collect();
                for key in keys {
                    prop_assert!(seen.insert(key));
                }
            }
            let total: u32 = resolved.concepts.iter().map(|c| c.mention_count).sum();
            prop_assert_eq!(total as usize, mentions.len());
        }

        #[test]
        fn prop_salience_is_monotonic(saliences in proptest::collection::vec(0.0f32..1.0, 1..20)) {
            let mut concept = Concept::new("entropy");
            let mut last = concept.salience;
            for s in saliences {
                concept.absorb(&mention("entropy", 0, s));
                prop_assert!(concept.salience >= last);
                prop_assert!(concept.salience <= 1.0);
                last = concept.salience;
            }
        }
    }
}
