use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Database, IndexModel,
};

pub struct IndexSpec {
    pub collection: &'static str,
    pub keys: Document,
    pub unique: bool,
    // startup fails when a required index cannot be built
    pub required: bool,
}

fn spec(collection: &'static str, keys: Document, unique: bool, required: bool) -> IndexSpec {
    IndexSpec { collection, keys, unique, required }
}

/// Indexes in creation order. The alert dedup guard goes first.
pub fn index_specs() -> Vec<IndexSpec> {
    vec![
        // dedup log for alert fan-out
        spec("sent_alerts", doc! { "user_id": 1, "ticker": 1, "kind": 1, "reference": 1 }, true, true),
        spec("sent_alerts", doc! { "message_id": 1 }, false, true),
        // documents are fanned out once per (ticker, content)
        spec("reports", doc! { "ticker": 1, "kind": 1, "reference_date": 1, "title": 1 }, true, true),
        spec("dividends", doc! { "ticker": 1, "record_date": 1, "amount": 1 }, true, true),
        // users: unique email, lookups by phone (webhooks) and subscription (Stripe)
        spec("users", doc! { "email": 1 }, true, true),
        spec("users", doc! { "whatsapp_phone": 1 }, false, true),
        spec("users", doc! { "stripe_subscription_id": 1 }, false, true),
        spec("funds", doc! { "ticker": 1 }, true, true),
        // follows: one row per (user, fund), fan-out scans by ticker
        spec("follows", doc! { "user_id": 1, "ticker": 1 }, true, true),
        spec("follows", doc! { "ticker": 1, "notify": 1 }, false, true),
        // debug listing only
        spec("whatsapp_events", doc! { "kind": 1, "received_at": -1 }, false, false),
    ]
}

async fn create_index(db: &Database, spec: IndexSpec) -> Result<(), String> {
    let col = db.collection::<Document>(spec.collection);
    let mut model = IndexModel::builder().keys(spec.keys).build();
    if spec.unique {
        model.options = Some(IndexOptions::builder().unique(true).build());
    }

    col.create_index(model, None)
        .await
        .map_err(|e| format!("{}: {e}", spec.collection))?;
    Ok(())
}

pub async fn ensure_indexes(db: &Database) -> Result<(), String> {
    for s in index_specs() {
        let collection = s.collection;
        let required = s.required;

        match create_index(db, s).await {
            Ok(()) => {}
            Err(e) if required => return Err(e),
            Err(e) => tracing::warn!(collection, error = %e, "optional index not created"),
        }
    }
    Ok(())
}
