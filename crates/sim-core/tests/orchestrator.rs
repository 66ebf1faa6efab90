//! Turn loop integration tests.

mod common;

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{feed_uris, orchestrator, profiles, Eager, FaultyStore, Passive};
use sim_core::{
    HeuristicReasoner, InMemoryStore, PersistenceStore, RunPhase, SeenPostsTracker, SimError,
    StoreError,
};
use sim_records::{fixtures, ActionType, FeedKey, FeedStrategy, RunConfig, RunStatus};

fn chronological(agents: usize, turns: u32, k: usize) -> RunConfig {
    RunConfig::new(agents, turns, k)
}

#[tokio::test]
async fn test_five_posts_drain_over_three_turns() {
    let store = Arc::new(InMemoryStore::new());
    let mut orch = orchestrator(store.clone(), fixtures::posts_by("c", 5), Arc::new(Passive));

    let summary = orch
        .execute_run(&chronological(1, 3, 3), &profiles(&["a"]))
        .await
        .unwrap();
    let run_id = summary.run.run_id.clone();
    assert_eq!(summary.run.status, RunStatus::Completed);
    assert_eq!(summary.turns.len(), 3);
    assert_eq!(orch.phase(), RunPhase::RunComplete);

    let key = |turn| FeedKey::new(run_id.clone(), turn, "a", FeedStrategy::Chronological);
    assert_eq!(feed_uris(store.as_ref(), &key(0)).unwrap(), vec!["p5", "p4", "p3"]);
    assert_eq!(feed_uris(store.as_ref(), &key(1)).unwrap(), vec!["p2", "p1"]);
    assert!(feed_uris(store.as_ref(), &key(2)).unwrap().is_empty());
}

#[tokio::test]
async fn test_two_agents_share_snapshot_within_turn() {
    let store = Arc::new(InMemoryStore::new());
    let mut orch = orchestrator(store.clone(), fixtures::posts_by("c", 3), Arc::new(Passive));

    let summary = orch
        .execute_run(&chronological(2, 3, 2), &profiles(&["b", "a"]))
        .await
        .unwrap();
    let run_id = summary.run.run_id;

    for agent in ["a", "b"] {
        let key = |turn| FeedKey::new(run_id.clone(), turn, agent, FeedStrategy::Chronological);
        assert_eq!(feed_uris(store.as_ref(), &key(0)).unwrap(), vec!["p3", "p2"]);
        assert_eq!(feed_uris(store.as_ref(), &key(1)).unwrap(), vec!["p1"]);
        assert!(feed_uris(store.as_ref(), &key(2)).unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_second_follow_of_same_handle_dropped() {
    let store = Arc::new(InMemoryStore::new());
    let mut orch = orchestrator(
        store.clone(),
        fixtures::posts_by("h", 2),
        Arc::new(Eager::default()),
    );

    let summary = orch
        .execute_run(&chronological(1, 2, 1), &profiles(&["a"]))
        .await
        .unwrap();
    let run_id = summary.run.run_id;

    assert_eq!(summary.turns[0].total_actions[&ActionType::Follow], 1);
    assert_eq!(summary.turns[1].total_actions[&ActionType::Follow], 0);
    assert_eq!(summary.turns[1].total_actions[&ActionType::Like], 1);

    let graph = store.load_follow_graph(&run_id).unwrap();
    assert_eq!(graph.following("a"), BTreeSet::from(["h".to_string()]));
    assert_eq!(graph.edge_count(), 1);
}

#[tokio::test]
async fn test_no_agent_sees_a_post_twice() {
    let store = Arc::new(InMemoryStore::new());
    let mut orch = orchestrator(
        store.clone(),
        fixtures::sample_posts(),
        Arc::new(HeuristicReasoner::new(3)),
    );
    let config = RunConfig::new(4, 4, 2).with_strategies(FeedStrategy::all().iter().copied());

    let summary = orch
        .execute_run(&config, &fixtures::sample_profiles())
        .await
        .unwrap();
    let run_id = summary.run.run_id;

    let feeds = store.load_feeds(&run_id, 4).unwrap();
    assert_eq!(feeds.len(), 4 * 4 * 2);
    for profile in fixtures::sample_profiles() {
        let mine: Vec<_> = feeds
            .iter()
            .filter(|f| f.agent_handle == profile.handle)
            .collect();
        // Strategies of one turn may overlap; turns must not
        let mut shown = HashSet::new();
        let mut per_turn_total = 0;
        for turn in 0..4 {
            let turn_uris: HashSet<&String> = mine
                .iter()
                .filter(|f| f.turn_number == turn)
                .flat_map(|f| f.post_uris.iter())
                .collect();
            per_turn_total += turn_uris.len();
            shown.extend(turn_uris);
        }
        assert_eq!(shown.len(), per_turn_total, "{} saw a post twice", profile.handle);

        for feed in &mine {
            assert!(feed.len() <= 2);
            for uri in &feed.post_uris {
                let post = fixtures::get_post(uri).unwrap();
                assert_ne!(post.author_handle, profile.handle);
            }
        }
    }
}

#[tokio::test]
async fn test_failed_and_slow_agents_record_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let reasoner = Eager {
        failing: HashSet::from(["b".to_string()]),
        slow: HashSet::from(["c".to_string()]),
    };
    let mut orch = orchestrator(store.clone(), fixtures::posts_by("z", 4), Arc::new(reasoner));

    let summary = orch
        .execute_run(&chronological(3, 1, 2), &profiles(&["a", "b", "c"]))
        .await
        .unwrap();
    let run_id = summary.run.run_id;

    assert_eq!(summary.run.status, RunStatus::Completed);
    assert_eq!(summary.turns[0].failed_agents, vec!["b", "c"]);
    let actions = store.load_actions(&run_id, 0).unwrap();
    assert!(!actions.is_empty());
    assert!(actions.iter().all(|a| a.agent_handle == "a"));

    // Failed agents still had their feeds recorded
    let key = FeedKey::new(run_id, 0, "b", FeedStrategy::Chronological);
    assert_eq!(feed_uris(store.as_ref(), &key).unwrap().len(), 2);
}

#[tokio::test]
async fn test_beliefs_accumulate_per_turn() {
    let store = Arc::new(InMemoryStore::new());
    let mut orch = orchestrator(
        store,
        fixtures::posts_by("z", 4),
        Arc::new(Eager::default()),
    );
    orch.execute_run(&chronological(1, 2, 1), &profiles(&["a"]))
        .await
        .unwrap();
    let beliefs = orch.beliefs("a").unwrap();
    assert_eq!(beliefs.notes, vec!["turn 0", "turn 1"]);
}

#[tokio::test]
async fn test_duplicate_feed_fails_run() {
    let mut faulty = FaultyStore::new();
    faulty.duplicate_feed_for = Some((1, "b".to_string()));
    let store = Arc::new(faulty);
    let mut orch = orchestrator(
        store.clone(),
        fixtures::posts_by("z", 6),
        Arc::new(Eager::default()),
    );

    let err = orch
        .execute_run(&chronological(2, 3, 1), &profiles(&["a", "b"]))
        .await
        .unwrap_err();
    let (run_id, turn) = match &err {
        SimError::TurnFailed { run_id, turn, .. } => (run_id.clone(), *turn),
        other => panic!("unexpected error: {other}"),
    };
    assert_eq!(turn, 1);
    assert!(matches!(
        err.root(),
        SimError::Store(StoreError::DuplicateFeed(_))
    ));

    let run = store.get_run(&run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    // The other agent finished its turn; the turn itself was not summarised
    assert!(store
        .load_actions(&run_id, 1)
        .unwrap()
        .iter()
        .all(|a| a.agent_handle == "a"));
    assert!(!store.load_actions(&run_id, 1).unwrap().is_empty());
    assert!(store.load_turn_metadata(&run_id, 1).unwrap().is_none());
}

#[tokio::test]
async fn test_exhausted_retries_leave_run_resumable() {
    let mut faulty = FaultyStore::new();
    faulty.fail_metadata_turn = Some(1);
    let store = Arc::new(faulty);
    let posts = fixtures::posts_by("z", 6);
    let mut orch = orchestrator(store.clone(), posts.clone(), Arc::new(Eager::default()));

    let err = orch
        .execute_run(&chronological(2, 3, 1), &profiles(&["a", "b"]))
        .await
        .unwrap_err();
    let run_id = match &err {
        SimError::TurnFailed { run_id, turn: 1, .. } => run_id.clone(),
        other => panic!("unexpected error: {other}"),
    };
    assert!(matches!(err.root(), SimError::Store(StoreError::Unavailable(_))));
    assert_eq!(
        store.get_run(&run_id).unwrap().unwrap().status,
        RunStatus::Running
    );
    let turn_one_actions = store.load_actions(&run_id, 1).unwrap().len();
    let turn_one_feeds = store.load_turn_feeds(&run_id, 1).unwrap();

    store.heal();
    let mut orch = orchestrator(store.clone(), posts, Arc::new(Eager::default()));
    let summary = orch.resume(&run_id, &profiles(&["a", "b"])).await.unwrap();

    assert_eq!(summary.run.status, RunStatus::Completed);
    assert_eq!(
        summary.turns.iter().map(|t| t.turn_number).collect::<Vec<_>>(),
        vec![1, 2]
    );
    // Turn 1 was not replayed: same feeds, no extra actions
    assert_eq!(store.load_turn_feeds(&run_id, 1).unwrap(), turn_one_feeds);
    assert_eq!(store.load_actions(&run_id, 1).unwrap().len(), turn_one_actions);
    assert_eq!(summary.turns[0].action_total(), turn_one_actions);

    // Follows recorded before the interruption are still known
    let graph = store.load_follow_graph(&run_id).unwrap();
    assert!(graph.follows("a", "z"));
    assert!(graph.follows("b", "z"));
    let follows = (0..3)
        .flat_map(|t| store.load_actions(&run_id, t).unwrap())
        .filter(|a| a.action_type == ActionType::Follow)
        .count();
    assert_eq!(follows, 2);
}

fn action_ids(store: &dyn PersistenceStore, run_id: &str, turn: u32) -> Vec<String> {
    store
        .load_actions(run_id, turn)
        .unwrap()
        .into_iter()
        .map(|a| a.action_id)
        .collect()
}

#[tokio::test]
async fn test_retried_action_write_recorded_once() {
    let faulty = FaultyStore::new();
    faulty.lost_action_acks.store(1, Ordering::SeqCst);
    let store = Arc::new(faulty);
    let mut orch = orchestrator(
        store.clone(),
        fixtures::posts_by("z", 2),
        Arc::new(Eager::default()),
    );

    let summary = orch
        .execute_run(&chronological(2, 1, 1), &profiles(&["a", "b"]))
        .await
        .unwrap();
    let run_id = summary.run.run_id;

    assert_eq!(summary.run.status, RunStatus::Completed);
    let ids = action_ids(store.as_ref(), &run_id, 0);
    assert_eq!(ids.len(), 4, "a like and a follow per agent");
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    assert_eq!(summary.turns[0].action_total(), 4);

    let graph = store.load_follow_graph(&run_id).unwrap();
    assert!(graph.follows("a", "z"));
    assert!(graph.follows("b", "z"));
}

#[tokio::test]
async fn test_failed_action_write_redone_on_resume() {
    let mut faulty = FaultyStore::new();
    faulty.fail_action_after = Some(1);
    let store = Arc::new(faulty);
    let posts = fixtures::posts_by("z", 2);
    let mut orch = orchestrator(store.clone(), posts.clone(), Arc::new(Eager::default()));

    let err = orch
        .execute_run(&chronological(2, 1, 1), &profiles(&["a", "b"]))
        .await
        .unwrap_err();
    let run_id = match &err {
        SimError::TurnFailed { run_id, turn: 0, .. } => run_id.clone(),
        other => panic!("unexpected error: {other}"),
    };
    assert!(matches!(err.root(), SimError::Store(StoreError::Unavailable(_))));
    assert_eq!(
        store.get_run(&run_id).unwrap().unwrap().status,
        RunStatus::Running
    );
    // Only the first agent's batch made it, and all of it did
    let before = store.load_actions(&run_id, 0).unwrap();
    assert_eq!(before.len(), 2);
    assert!(before.iter().all(|a| a.agent_handle == "a"));

    store.heal();
    let mut orch = orchestrator(store.clone(), posts, Arc::new(Eager::default()));
    let summary = orch.resume(&run_id, &profiles(&["a", "b"])).await.unwrap();
    assert_eq!(summary.run.status, RunStatus::Completed);

    let after = store.load_actions(&run_id, 0).unwrap();
    assert_eq!(after.len(), 4);
    assert_eq!(&after[..2], &before[..], "first agent was not run again");
    let b_types: Vec<ActionType> = after
        .iter()
        .filter(|a| a.agent_handle == "b")
        .map(|a| a.action_type)
        .collect();
    assert_eq!(b_types, vec![ActionType::Like, ActionType::Follow]);

    let graph = store.load_follow_graph(&run_id).unwrap();
    assert!(graph.follows("a", "z"));
    assert!(graph.follows("b", "z"));
    assert_eq!(summary.turns[0].action_total(), 4);
}

#[tokio::test]
async fn test_failed_follow_graph_write_rebuilt_on_resume() {
    let mut faulty = FaultyStore::new();
    faulty.fail_follow_graph = true;
    let store = Arc::new(faulty);
    let posts = fixtures::posts_by("z", 4);
    let mut orch = orchestrator(store.clone(), posts.clone(), Arc::new(Eager::default()));

    let err = orch
        .execute_run(&chronological(2, 2, 1), &profiles(&["a", "b"]))
        .await
        .unwrap_err();
    let run_id = match &err {
        SimError::TurnFailed { run_id, turn: 0, .. } => run_id.clone(),
        other => panic!("unexpected error: {other}"),
    };
    assert!(store.load_follow_graph(&run_id).unwrap().is_empty());
    let turn_zero = action_ids(store.as_ref(), &run_id, 0);
    assert_eq!(turn_zero.len(), 4);

    store.heal();
    let mut orch = orchestrator(store.clone(), posts, Arc::new(Eager::default()));
    let summary = orch.resume(&run_id, &profiles(&["a", "b"])).await.unwrap();
    assert_eq!(summary.run.status, RunStatus::Completed);
    assert_eq!(action_ids(store.as_ref(), &run_id, 0), turn_zero);

    // Follows come back from the recorded actions and are not repeated
    let graph = store.load_follow_graph(&run_id).unwrap();
    assert!(graph.follows("a", "z"));
    assert!(graph.follows("b", "z"));
    let follows = (0..2)
        .flat_map(|t| store.load_actions(&run_id, t).unwrap())
        .filter(|a| a.action_type == ActionType::Follow)
        .count();
    assert_eq!(follows, 2);
}

#[tokio::test]
async fn test_resume_rejects_finished_runs() {
    let store = Arc::new(InMemoryStore::new());
    let mut orch = orchestrator(store, fixtures::posts_by("z", 2), Arc::new(Passive));
    let summary = orch
        .execute_run(&chronological(1, 1, 1), &profiles(&["a"]))
        .await
        .unwrap();
    let err = orch
        .resume(&summary.run.run_id, &profiles(&["a"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SimError::NotResumable {
            status: RunStatus::Completed,
            ..
        }
    ));
    assert!(matches!(
        orch.resume("run_missing", &profiles(&["a"])).await,
        Err(SimError::Store(StoreError::RunNotFound(_)))
    ));
}

#[tokio::test]
async fn test_invalid_configuration_rejected_before_start() {
    let store = Arc::new(InMemoryStore::new());
    let mut orch = orchestrator(store.clone(), fixtures::posts_by("z", 2), Arc::new(Passive));

    let err = orch
        .execute_run(&chronological(1, 1, 0), &profiles(&["a"]))
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::Configuration(_)));

    let err = orch
        .execute_run(&chronological(3, 1, 1), &profiles(&["a"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SimError::InsufficientAgents {
            requested: 3,
            available: 1
        }
    ));
    assert!(store.list_runs().unwrap().is_empty());
}

#[tokio::test]
async fn test_turn_data_hydrates_feeds() {
    let store = Arc::new(InMemoryStore::new());
    let mut orch = orchestrator(
        store.clone(),
        fixtures::sample_posts(),
        Arc::new(Eager::default()),
    );
    let config = RunConfig::new(2, 2, 3).with_strategies(FeedStrategy::all().iter().copied());
    let summary = orch
        .execute_run(&config, &fixtures::sample_profiles())
        .await
        .unwrap();
    let run_id = summary.run.run_id;

    let data = orch.get_turn_data(&run_id, 1).unwrap().unwrap();
    assert_eq!(data.metadata.turn_number, 1);
    assert_eq!(data.feeds.len(), 2);
    let alice = &data.feeds["alice.bsky"];
    assert_eq!(alice.len(), 2);
    assert_eq!(alice[0].feed.strategy, FeedStrategy::Chronological);
    assert_eq!(alice[1].feed.strategy, FeedStrategy::SimilarityRag);
    for hydrated in alice {
        let uris: Vec<&String> = hydrated.posts.iter().map(|p| &p.uri).collect();
        assert_eq!(uris, hydrated.feed.post_uris.iter().collect::<Vec<_>>());
    }
    assert_eq!(
        data.actions.values().map(Vec::len).sum::<usize>(),
        summary.turns[1].action_total()
    );

    assert!(orch.get_turn_data(&run_id, 5).unwrap().is_none());
    assert_eq!(orch.list_runs().unwrap().len(), 1);
    assert!(orch.get_run(&run_id).unwrap().is_some());
}

#[tokio::test]
async fn test_missing_post_reported_on_hydration() {
    let store = Arc::new(InMemoryStore::new());
    let mut orch = orchestrator(store.clone(), fixtures::posts_by("z", 3), Arc::new(Passive));
    let summary = orch
        .execute_run(&chronological(1, 1, 3), &profiles(&["a"]))
        .await
        .unwrap();

    let smaller = orchestrator(store, fixtures::posts_by("z", 2), Arc::new(Passive));
    let err = smaller
        .get_turn_data(&summary.run.run_id, 0)
        .unwrap_err();
    match err {
        SimError::MissingPost { agent, index, uri, .. } => {
            assert_eq!(agent, "a");
            assert_eq!(index, 0);
            assert_eq!(uri, "p3");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_seen_index_matches_persisted_feeds() {
    let store = Arc::new(InMemoryStore::new());
    let mut orch = orchestrator(store.clone(), fixtures::posts_by("z", 5), Arc::new(Passive));
    let summary = orch
        .execute_run(&chronological(1, 2, 2), &profiles(&["a"]))
        .await
        .unwrap();

    let index = SeenPostsTracker::new(store.as_ref())
        .load(&summary.run.run_id, 2)
        .unwrap();
    let expected: HashSet<String> = ["p5", "p4", "p3", "p2"].iter().map(|s| s.to_string()).collect();
    assert_eq!(index["a"], expected);
}
