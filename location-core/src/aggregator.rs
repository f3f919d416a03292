use std::collections::BTreeMap;

use crate::types::{StoredEvent, VehicleBatch};

/// Partition raw events per vehicle, producing one time-ordered batch for each.
/// Batches come out in vehicle id order, and an empty input gives no batches.
pub fn group_by_vehicle(events: Vec<StoredEvent>) -> Vec<VehicleBatch> {
    let mut partitions: BTreeMap<String, Vec<StoredEvent>> = BTreeMap::new();

    for stored in events {
        partitions
            .entry(stored.event.vehicle_id.clone())
            .or_default()
            .push(stored);
    }

    partitions
        .into_iter()
        .filter_map(|(vehicle_id, mut events)| {
            events.sort_by_key(|s| (s.event.timestamp_ms, s.id));

            let max_source_id = events.iter().map(|s| s.id).max()?;
            let start_time = events.first()?.event.timestamp_ms;
            let end_time = events.last()?.event.timestamp_ms;

            let (timestamps, coordinates) = events
                .into_iter()
                .map(|s| (s.event.timestamp_ms, s.event.point))
                .unzip();

            Some(VehicleBatch {
                vehicle_id,
                start_time,
                end_time,
                timestamps,
                coordinates,
                max_source_id,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LocationEvent, Point};

    fn stored(id: u64, vehicle_id: &str, timestamp_ms: i64, lon: f64) -> StoredEvent {
        StoredEvent {
            id,
            event: LocationEvent::new(vehicle_id, timestamp_ms, Point::new(lon, 50.0)),
        }
    }

    #[test]
    fn test_no_events_no_batches() {
        assert!(group_by_vehicle(vec![]).is_empty());
    }

    #[test]
    fn test_groups_and_orders_by_timestamp() {
        let events = vec![
            stored(1, "e-00-001", 1200, 3.0),
            stored(2, "e-00-000", 1100, 2.0),
            stored(3, "e-00-001", 1000, 1.0),
            stored(4, "e-00-000", 1000, 1.0),
            stored(5, "e-00-001", 1100, 2.0),
        ];

        let batches = group_by_vehicle(events);

        assert_eq!(batches.len(), 2);

        assert_eq!(batches[0].vehicle_id, "e-00-000");
        assert_eq!(batches[0].timestamps, vec![1000, 1100]);
        assert_eq!(batches[0].start_time, 1000);
        assert_eq!(batches[0].end_time, 1100);
        assert_eq!(batches[0].max_source_id, 4);

        assert_eq!(batches[1].vehicle_id, "e-00-001");
        assert_eq!(batches[1].timestamps, vec![1000, 1100, 1200]);
        assert_eq!(
            batches[1].coordinates,
            vec![
                Point::new(1.0, 50.0),
                Point::new(2.0, 50.0),
                Point::new(3.0, 50.0)
            ]
        );
        assert_eq!(batches[1].start_time, 1000);
        assert_eq!(batches[1].end_time, 1200);
        assert_eq!(batches[1].max_source_id, 5);
    }
}
