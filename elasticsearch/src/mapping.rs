//! Plan index mapping.

use plan_registry_core::decompose::EntityKind;
use plan_registry_core::index::{FLATTEN_FIELD, JOIN_FIELD, PARENT_FIELD};
use serde_json::{Value, json};

/// Index settings and mappings for the plan index.
///
/// The index must have exactly one primary shard. Services are routed by
/// their association and associations by the plan, so with more shards a
/// service and its parent can be placed apart and joins would miss it.
#[must_use]
pub fn plan_index_body() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1
        },
        "mappings": {
            "properties": {
                "objectId": { "type": "keyword" },
                "objectType": { "type": "keyword" },
                "_org": { "type": "keyword" },
                "planType": { "type": "keyword" },
                "name": { "type": "text" },
                "creationDate": { "type": "date", "format": "dd-MM-yyyy" },
                (PARENT_FIELD): { "type": "keyword" },
                (FLATTEN_FIELD): { "type": "keyword" },
                (JOIN_FIELD): {
                    "type": "join",
                    "relations": {
                        (EntityKind::Plan.storage_name()): [
                            EntityKind::Association.storage_name(),
                            EntityKind::CostShare.storage_name()
                        ],
                        (EntityKind::Association.storage_name()): EntityKind::Service.storage_name()
                    }
                }
            }
        }
    })
}
