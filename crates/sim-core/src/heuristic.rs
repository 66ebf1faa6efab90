//! Offline reasoner.
//!
//! A seeded, rule-based [`AgentReasoner`] for running simulations without an
//! external model. Each decision draws from an RNG seeded by the run seed,
//! the agent and the post, so results do not depend on scheduling order.

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

use sim_records::{ActionType, AgentProfile};

use crate::reasoner::{
    AgentReasoner, BeliefDelta, BeliefState, Engagement, PostContext, ReasoningError,
    TurnObservations,
};

const MIN_TOKEN_LEN: usize = 4;

/// Likes posts that share words with the agent's bio.
#[derive(Debug, Clone)]
pub struct HeuristicReasoner {
    seed: u64,
    /// Chance of liking a post with no shared words
    pub serendipity: f64,
    /// Chance of commenting on a liked post
    pub comment_probability: f64,
    /// Chance of following an offered author after liking their post
    pub follow_probability: f64,
}

impl HeuristicReasoner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            serendipity: 0.1,
            comment_probability: 0.25,
            follow_probability: 0.5,
        }
    }

    fn rng_for(&self, agent: &str, uri: &str) -> SmallRng {
        let mut hash = self.seed ^ 0xcbf2_9ce4_8422_2325;
        for byte in agent.bytes().chain([0u8]).chain(uri.bytes()) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        SmallRng::seed_from_u64(hash)
    }
}

/// Lowercased words long enough to carry topic.
fn topic_words(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl AgentReasoner for HeuristicReasoner {
    async fn evaluate(
        &self,
        agent: &AgentProfile,
        _beliefs: &BeliefState,
        context: PostContext<'_>,
    ) -> Result<Vec<Engagement>, ReasoningError> {
        let post = context.post;
        let mut rng = self.rng_for(&agent.handle, &post.uri);
        let interests = topic_words(&agent.bio);
        let shared: Vec<String> = topic_words(&post.text)
            .intersection(&interests)
            .cloned()
            .collect();

        let mut engagements = Vec::new();
        let liked = if let Some(topic) = shared.first() {
            engagements.push(Engagement::like(format!("interested in {}", topic)));
            true
        } else if rng.gen_bool(self.serendipity) {
            engagements.push(Engagement::like("caught my eye"));
            true
        } else {
            false
        };

        if liked && rng.gen_bool(self.comment_probability) {
            let text = match shared.first() {
                Some(topic) => format!("Good point about {}.", topic),
                None => "Interesting.".to_string(),
            };
            engagements.push(Engagement::comment(text, "wanted to respond"));
        }

        if liked
            && context.can_follow_author
            && (shared.len() >= 2 || rng.gen_bool(self.follow_probability))
        {
            engagements.push(Engagement::follow(
                post.author_handle.clone(),
                format!("enjoys posts by {}", post.author_handle),
            ));
        }

        Ok(engagements)
    }

    async fn update_beliefs(
        &self,
        _agent: &AgentProfile,
        _beliefs: &BeliefState,
        observations: TurnObservations<'_>,
    ) -> Result<BeliefDelta, ReasoningError> {
        let counts = sim_records::count_actions(observations.actions);
        Ok(BeliefDelta {
            summary: format!(
                "turn {}: read {} posts, liked {}, commented {}, followed {}",
                observations.turn_number,
                observations.posts.len(),
                counts[&ActionType::Like],
                counts[&ActionType::Comment],
                counts[&ActionType::Follow],
            ),
        })
    }
}
