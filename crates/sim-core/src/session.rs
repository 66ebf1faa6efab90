//! Agent Session
//!
//! Runs one agent's turn: every post of its feed goes to the reasoner in
//! feed order, each returned intent is validated, and valid intents become
//! actions. Invalid intents are logged and dropped. A belief update may
//! follow; its failure does not discard the recorded actions.

use std::collections::{BTreeSet, HashSet};

use sim_records::{AgentAction, AgentProfile, Post};

use crate::reasoner::{
    AgentReasoner, BeliefDelta, BeliefState, Engagement, EngagementIntent, PostContext,
    ReasoningError, TurnObservations,
};

/// Why an intent was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIntent {
    #[error("agent cannot engage with its own post")]
    OwnPost,
    #[error("agent cannot follow itself")]
    SelfFollow,
    #[error("already following '{0}'")]
    AlreadyFollowing(String),
    #[error("follow of '{target}' was not offered (post author is '{author}')")]
    FollowNotOffered { target: String, author: String },
    #[error("post already liked this session")]
    DuplicateLike,
    #[error("comment text is empty")]
    EmptyComment,
}

/// An intent that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedIntent {
    pub post_uri: String,
    pub intent: EngagementIntent,
    pub reason: InvalidIntent,
}

/// Result of a completed session.
#[derive(Debug, Clone, Default)]
pub struct SessionOutput {
    /// Validated actions, in the order they were proposed
    pub actions: Vec<AgentAction>,
    pub belief_delta: Option<BeliefDelta>,
    pub dropped: Vec<DroppedIntent>,
}

impl SessionOutput {
    /// Handles newly followed this session.
    pub fn follows(&self) -> impl Iterator<Item = &str> {
        self.actions
            .iter()
            .filter_map(|a| a.target_handle.as_deref())
    }
}

/// Mutable per-session validation state.
#[derive(Debug, Default)]
struct SessionState {
    liked: HashSet<String>,
    following: BTreeSet<String>,
}

/// One agent's turn.
#[derive(Debug, Clone)]
pub struct AgentSession {
    run_id: String,
    turn_number: u32,
    agent: AgentProfile,
    following: BTreeSet<String>,
    beliefs: BeliefState,
    update_beliefs: bool,
}

impl AgentSession {
    /// `following` is the agent's follow set at the start of the turn.
    pub fn new(
        run_id: impl Into<String>,
        turn_number: u32,
        agent: AgentProfile,
        following: BTreeSet<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            turn_number,
            agent,
            following,
            beliefs: BeliefState::default(),
            update_beliefs: true,
        }
    }

    pub fn with_beliefs(mut self, beliefs: BeliefState) -> Self {
        self.beliefs = beliefs;
        self
    }

    pub fn with_belief_update(mut self, enabled: bool) -> Self {
        self.update_beliefs = enabled;
        self
    }

    pub fn agent(&self) -> &AgentProfile {
        &self.agent
    }

    /// Processes `posts` in order. A reasoner error aborts the session.
    pub async fn run(
        &self,
        posts: &[Post],
        reasoner: &dyn AgentReasoner,
    ) -> Result<SessionOutput, ReasoningError> {
        let mut state = SessionState {
            liked: HashSet::new(),
            following: self.following.clone(),
        };
        let mut output = SessionOutput::default();

        for post in posts {
            let context = PostContext {
                post,
                can_follow_author: self.can_follow(&state, &post.author_handle),
            };
            let engagements = reasoner
                .evaluate(&self.agent, &self.beliefs, context)
                .await?;

            for engagement in engagements {
                let intent = engagement.intent.clone();
                match self.validate(&mut state, post, engagement) {
                    Ok(action) => {
                        tracing::debug!(
                            run_id = %self.run_id,
                            turn = self.turn_number,
                            agent = %self.agent.handle,
                            post = %post.uri,
                            action = %action.action_type,
                            "intent accepted"
                        );
                        output.actions.push(action);
                    }
                    Err(reason) => {
                        tracing::warn!(
                            run_id = %self.run_id,
                            turn = self.turn_number,
                            agent = %self.agent.handle,
                            post = %post.uri,
                            %reason,
                            "dropping invalid intent"
                        );
                        output.dropped.push(DroppedIntent {
                            post_uri: post.uri.clone(),
                            intent,
                            reason,
                        });
                    }
                }
            }
        }

        if self.update_beliefs {
            let observations = TurnObservations {
                turn_number: self.turn_number,
                posts,
                actions: &output.actions,
            };
            match reasoner
                .update_beliefs(&self.agent, &self.beliefs, observations)
                .await
            {
                Ok(delta) => output.belief_delta = Some(delta),
                Err(e) => tracing::warn!(
                    run_id = %self.run_id,
                    turn = self.turn_number,
                    agent = %self.agent.handle,
                    error = %e,
                    "belief update failed"
                ),
            }
        }

        Ok(output)
    }

    fn can_follow(&self, state: &SessionState, author: &str) -> bool {
        author != self.agent.handle && !state.following.contains(author)
    }

    /// Checks one intent against the session state, recording its effect
    /// when valid.
    fn validate(
        &self,
        state: &mut SessionState,
        post: &Post,
        engagement: Engagement,
    ) -> Result<AgentAction, InvalidIntent> {
        if post.is_authored_by(&self.agent.handle) {
            return Err(InvalidIntent::OwnPost);
        }
        let Engagement { intent, reasoning } = engagement;
        let run_id = self.run_id.as_str();
        let agent = self.agent.handle.as_str();

        match intent {
            EngagementIntent::Like => {
                if !state.liked.insert(post.uri.clone()) {
                    return Err(InvalidIntent::DuplicateLike);
                }
                Ok(AgentAction::like(
                    run_id,
                    self.turn_number,
                    agent,
                    post.uri.clone(),
                    reasoning,
                ))
            }
            EngagementIntent::Comment(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(InvalidIntent::EmptyComment);
                }
                Ok(AgentAction::comment(
                    run_id,
                    self.turn_number,
                    agent,
                    post.uri.clone(),
                    text,
                    reasoning,
                ))
            }
            EngagementIntent::Follow(target) => {
                if target == agent {
                    return Err(InvalidIntent::SelfFollow);
                }
                if state.following.contains(&target) {
                    return Err(InvalidIntent::AlreadyFollowing(target));
                }
                if target != post.author_handle {
                    return Err(InvalidIntent::FollowNotOffered {
                        target,
                        author: post.author_handle.clone(),
                    });
                }
                state.following.insert(target.clone());
                Ok(AgentAction::follow(
                    run_id,
                    self.turn_number,
                    agent,
                    target,
                    Some(post.uri.clone()),
                    reasoning,
                ))
            }
        }
    }
}
