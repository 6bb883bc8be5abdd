use std::sync::Mutex;

use async_trait::async_trait;

use super::*;

#[derive(Debug, thiserror::Error)]
#[error("fake backend unavailable")]
struct FakeError;

/// Trend source whose answer the test can swap between passes.
#[derive(Default)]
struct FakeTrends {
    answer: Mutex<Option<Vec<String>>>,
}

impl FakeTrends {
    fn set(&self, topics: &[&str]) {
        *self.answer.lock().unwrap() = Some(topics.iter().map(ToString::to_string).collect());
    }

    fn fail(&self) {
        *self.answer.lock().unwrap() = None;
    }
}

#[async_trait]
impl TrendSource for FakeTrends {
    type Error = FakeError;

    async fn current_trends(&self, _woeid: i64) -> Result<Vec<String>, FakeError> {
        self.answer.lock().unwrap().clone().ok_or(FakeError)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    List,
    Delete(Vec<String>),
    Add(Vec<String>),
}

/// Rule store that keeps rules in memory and records every call.
#[derive(Default)]
struct FakeRules {
    rules: Mutex<Vec<FilterRule>>,
    calls: Mutex<Vec<Call>>,
    next_id: Mutex<u32>,
    fail_add: Mutex<bool>,
}

impl FakeRules {
    fn with_tags(tags: &[&str]) -> Self {
        let store = Self::default();
        for tag in tags {
            let rule = store.make_rule(&NewRule::for_trend(tag));
            store.rules.lock().unwrap().push(rule);
        }
        store
    }

    fn make_rule(&self, new: &NewRule) -> FilterRule {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        FilterRule {
            id: format!("r{next}"),
            value: new.value.clone(),
            tag: new.tag.clone(),
        }
    }

    fn tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self.rules.lock().unwrap().iter().map(|r| r.tag.clone()).collect();
        tags.sort();
        tags
    }

    fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait]
impl RuleStore for FakeRules {
    type Error = FakeError;

    async fn list_rules(&self) -> Result<Vec<FilterRule>, FakeError> {
        self.calls.lock().unwrap().push(Call::List);
        Ok(self.rules.lock().unwrap().clone())
    }

    async fn delete_rules(&self, ids: &[String]) -> Result<(), FakeError> {
        self.calls.lock().unwrap().push(Call::Delete(ids.to_vec()));
        self.rules.lock().unwrap().retain(|r| !ids.contains(&r.id));
        Ok(())
    }

    async fn add_rules(&self, rules: &[NewRule]) -> Result<Vec<FilterRule>, FakeError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Add(rules.iter().map(|r| r.tag.clone()).collect()));
        if *self.fail_add.lock().unwrap() {
            return Err(FakeError);
        }
        let created: Vec<_> = rules.iter().map(|r| self.make_rule(r)).collect();
        self.rules.lock().unwrap().extend(created.iter().cloned());
        Ok(created)
    }
}

fn reconciler(
    trends: &Arc<FakeTrends>,
    rules: &Arc<FakeRules>,
) -> TrendReconciler<FakeTrends, FakeRules> {
    TrendReconciler::new(Arc::clone(trends), Arc::clone(rules), 1, Duration::from_secs(30))
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn removes_stale_and_adds_new_trends() {
    let trends = Arc::new(FakeTrends::default());
    trends.set(&["b", "c", "d"]);
    let rules = Arc::new(FakeRules::with_tags(&["a", "b", "c"]));
    let reconciler = reconciler(&trends, &rules);

    let outcome = reconciler.reconcile_once().await.unwrap();

    assert_eq!(outcome.removed, vec!["r1"]);
    assert_eq!(outcome.added, vec!["d"]);
    assert_eq!(rules.tags(), strings(&["b", "c", "d"]));
    assert_eq!(
        rules.take_calls(),
        vec![Call::List, Call::Delete(strings(&["r1"])), Call::Add(strings(&["d"]))],
        "delete must precede add"
    );

    let snapshot = reconciler.subscribe_rules().borrow().clone();
    let mut active: Vec<_> = snapshot.tags().map(str::to_string).collect();
    active.sort();
    assert_eq!(active, strings(&["b", "c", "d"]));
    assert_eq!(reconciler.state(), ReconcilerState::Idle);
}

#[tokio::test]
async fn second_pass_with_same_trends_changes_nothing() {
    let trends = Arc::new(FakeTrends::default());
    trends.set(&["b", "c", "d"]);
    let rules = Arc::new(FakeRules::with_tags(&["a", "b", "c"]));
    let reconciler = reconciler(&trends, &rules);

    reconciler.reconcile_once().await.unwrap();
    rules.take_calls();

    let outcome = reconciler.reconcile_once().await.unwrap();
    assert!(outcome.is_noop());
    assert_eq!(rules.take_calls(), vec![Call::List]);
}

#[tokio::test]
async fn duplicate_tags_are_collapsed() {
    let trends = Arc::new(FakeTrends::default());
    trends.set(&["x", "x", "y"]);
    let rules = Arc::new(FakeRules::with_tags(&["x", "x"]));
    let reconciler = reconciler(&trends, &rules);

    let outcome = reconciler.reconcile_once().await.unwrap();
    assert_eq!(outcome.removed, vec!["r2"]);
    assert_eq!(outcome.added, vec!["y"]);
    assert_eq!(rules.tags(), strings(&["x", "y"]));

    let trend_set = reconciler.subscribe_trends().borrow().clone();
    assert_eq!(trend_set.topics, strings(&["x", "y"]));
}

#[tokio::test]
async fn failed_refresh_keeps_previous_trends() {
    let trends = Arc::new(FakeTrends::default());
    trends.set(&["a", "b"]);
    let rules = Arc::new(FakeRules::default());
    let reconciler = reconciler(&trends, &rules);
    reconciler.reconcile_once().await.unwrap();
    let before = reconciler.subscribe_trends().borrow().clone();

    trends.fail();
    let outcome = reconciler.reconcile_once().await.unwrap();

    assert!(outcome.is_noop());
    assert_eq!(reconciler.subscribe_trends().borrow().topics, before.topics);
    assert_eq!(rules.tags(), strings(&["a", "b"]));
}

#[tokio::test]
async fn failed_first_refresh_leaves_existing_rules_alone() {
    let trends = Arc::new(FakeTrends::default());
    trends.fail();
    let rules = Arc::new(FakeRules::with_tags(&["kept"]));
    let reconciler = reconciler(&trends, &rules);

    let outcome = reconciler.reconcile_once().await.unwrap();
    assert!(outcome.is_noop());
    assert!(rules.take_calls().is_empty());
    assert_eq!(rules.tags(), strings(&["kept"]));
}

#[tokio::test]
async fn rule_store_failure_keeps_previous_snapshot() {
    let trends = Arc::new(FakeTrends::default());
    trends.set(&["a"]);
    let rules = Arc::new(FakeRules::default());
    let reconciler = reconciler(&trends, &rules);
    reconciler.reconcile_once().await.unwrap();

    trends.set(&["a", "b"]);
    *rules.fail_add.lock().unwrap() = true;
    let err = reconciler.reconcile_once().await.unwrap_err();

    assert!(err.to_string().contains("add"));
    let snapshot = reconciler.subscribe_rules().borrow().clone();
    assert_eq!(snapshot.tags().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(reconciler.state(), ReconcilerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn timer_runs_passes_until_stopped() {
    let trends = Arc::new(FakeTrends::default());
    trends.set(&["a"]);
    let rules = Arc::new(FakeRules::default());
    let reconciler = Arc::new(reconciler(&trends, &rules));
    let shutdown = CancellationToken::new();

    let timer = tokio::spawn(Arc::clone(&reconciler).run_timer(shutdown.clone()));

    // Nothing happens before the first interval has elapsed.
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(rules.take_calls().is_empty());

    trends.set(&["b"]);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(rules.tags(), strings(&["b"]));

    shutdown.cancel();
    timer.await.unwrap();
    assert_eq!(reconciler.state(), ReconcilerState::Stopped);

    // No further passes once stopped.
    rules.take_calls();
    trends.set(&["c"]);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(rules.take_calls().is_empty());
    assert!(reconciler.reconcile_once().await.unwrap().is_noop());
    assert!(rules.take_calls().is_empty());
}

#[test]
fn plan_keeps_first_rule_per_wanted_tag() {
    let active = vec![
        FilterRule {
            id: "1".into(),
            value: "v".into(),
            tag: "keep".into(),
        },
        FilterRule {
            id: "2".into(),
            value: "v".into(),
            tag: "gone".into(),
        },
    ];
    let (kept, delete, add) = plan(&active, &strings(&["keep", "new"]));
    assert_eq!(kept.len(), 1);
    assert_eq!(delete, vec!["2"]);
    assert_eq!(add, vec![NewRule::for_trend("new")]);
}
