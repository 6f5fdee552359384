//! Periodic producer of `day_event` and `data_update` broadcasts.

use super::broadcaster::Broadcaster;
use super::types::ServerEvent;
use crate::configuration::BroadcastSchedule;
use crate::network::types::unix_timestamp;
use chrono::Local;
use log::{debug, info};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const DATA_UPDATE_SOURCE: &str = "server_generator";

const LOCATIONS: [&str; 3] = ["Forgotten Ruins", "Shadow Forest", "Crystal Cave"];
const ARTIFACTS: [&str; 3] = ["A mighty artifact", "An ancient scroll", "An enchanted crystal"];
const TOPICS: [&str; 3] = ["Weather", "Game economy", "Monster activity"];

pub fn make_day_event() -> ServerEvent {
    let mut rng = rand::rng();
    let now = unix_timestamp();
    let location = LOCATIONS.choose(&mut rng).copied().unwrap_or(LOCATIONS[0]);
    let artifact = ARTIFACTS.choose(&mut rng).copied().unwrap_or(ARTIFACTS[0]);

    ServerEvent::DayEvent {
        event_name: format!("Rare artifact #{} found!", (now as u64) % 1000),
        description: format!("{} has appeared in '{}'.", artifact, location),
        timestamp_event: now,
    }
}

pub fn make_data_update() -> ServerEvent {
    let mut rng = rand::rng();
    let topic = TOPICS.choose(&mut rng).copied().unwrap_or(TOPICS[0]);
    let value: u32 = rng.random_range(1..=100);

    ServerEvent::DataUpdate {
        source: String::from(DATA_UPDATE_SOURCE),
        content: json!({
            "topic": topic,
            "value": value,
            "details": format!("Last update {}", Local::now().format("%H:%M:%S")),
        }),
        timestamp_update: unix_timestamp(),
    }
}

/// Random pause in `[min_interval, max_interval]`, millisecond resolution.
pub fn next_pause(schedule: &BroadcastSchedule) -> Duration {
    let min = schedule.min_interval.as_millis() as u64;
    let max = (schedule.max_interval.as_millis() as u64).max(min);
    Duration::from_millis(rand::rng().random_range(min..=max))
}

/// Generation loop. Never returns.
pub async fn run(broadcaster: Arc<Broadcaster>, schedule: BroadcastSchedule) {
    info!(
        "[WS] Event generator running (pause {:?}..{:?})",
        schedule.min_interval, schedule.max_interval
    );

    loop {
        publish(&broadcaster, make_day_event()).await;
        tokio::time::sleep(schedule.data_update_delay).await;
        publish(&broadcaster, make_data_update()).await;

        let pause = next_pause(&schedule);
        debug!("[WS] Next cycle in {:?}", pause);
        tokio::time::sleep(pause).await;
    }
}

async fn publish(broadcaster: &Broadcaster, event: ServerEvent) {
    broadcaster.record(event.clone());
    broadcaster.broadcast(&event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_day_event_fields() {
        let ServerEvent::DayEvent { event_name, description, timestamp_event } = make_day_event() else {
            panic!("expected a day_event");
        };
        assert!(event_name.starts_with("Rare artifact #"));
        assert!(LOCATIONS.iter().any(|l| description.contains(l)));
        assert!(timestamp_event > 0.0);
    }

    #[test]
    fn test_data_update_content() {
        let ServerEvent::DataUpdate { source, content, .. } = make_data_update() else {
            panic!("expected a data_update");
        };
        assert_eq!(source, DATA_UPDATE_SOURCE);
        assert!(TOPICS.contains(&content["topic"].as_str().unwrap()));
        let value = content["value"].as_u64().unwrap();
        assert!((1..=100).contains(&value));
        assert!(content["details"].as_str().unwrap().starts_with("Last update "));
    }

    #[test]
    fn test_next_pause_stays_in_bounds() {
        let schedule = BroadcastSchedule::default();
        for _ in 0..100 {
            let pause = next_pause(&schedule);
            assert!(pause >= schedule.min_interval && pause <= schedule.max_interval);
        }

        let fixed = BroadcastSchedule {
            min_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(2),
            data_update_delay: Duration::ZERO,
        };
        assert_eq!(next_pause(&fixed), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_cycle_records_and_sends_both_events() {
        let broadcaster = Arc::new(Broadcaster::new(20));
        let (tx, mut rx) = mpsc::unbounded_channel();
        broadcaster.register("127.0.0.1:1".parse().unwrap(), tx).await;

        let generator = tokio::spawn(run(Arc::clone(&broadcaster), BroadcastSchedule::default()));

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        generator.abort();

        let kinds: Vec<&str> = broadcaster.recent_events().iter().map(ServerEvent::kind).collect();
        assert_eq!(kinds, vec!["day_event", "data_update"]);
    }
}
