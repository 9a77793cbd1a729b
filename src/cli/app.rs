use anyhow::{Context, Result, bail};
use std::time::Duration;
use viewmirror::{
    DataGateway, EntityKind, Fields, MirrorConfig, MirrorRuntime, Record, RecordId, SortOption, Value, ViewHandle,
    ViewSnapshot,
};

const SEED_CATEGORIES: [&str; 3] = ["News", "Music", "Lessons"];
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DemoOptions {
    pub views: usize,
    pub batch: usize,
    pub seed: usize,
}

pub async fn run_demo(config: MirrorConfig, options: DemoOptions) -> Result<()> {
    let runtime = MirrorRuntime::start(config).context("failed to start the mirror runtime")?;
    let client = runtime.client();

    let categories = seed_categories(&client).await?;
    let media = seed_media(&client, &categories, options.seed).await?;
    for kind in [EntityKind::Audio, EntityKind::Video] {
        let assigned = runtime.assign_default_category(kind).await?;
        println!("{} uncategorized {} moved to '{}'", assigned, kind.table_name(), runtime.config().default_category);
    }

    let views = mount_views(&runtime, options.views).await?;

    if options.batch > 0 {
        run_batch(&runtime, options.batch).await?;
    }

    if let Some(target) = media.iter().find(|record| record.kind == EntityKind::Audio) {
        run_transcription(&client, &views, target).await?;
    }

    for view in &views {
        print_snapshot(&view.snapshot());
    }

    for view in views {
        view.unmount().await?;
    }
    runtime.shutdown().await;
    Ok(())
}

async fn seed_categories(client: &impl DataGateway) -> Result<Vec<RecordId>> {
    let mut ids = Vec::with_capacity(SEED_CATEGORIES.len());
    for name in SEED_CATEGORIES {
        let record = client
            .create(EntityKind::Category, fields(&[("name", Value::from(name))]))
            .await
            .with_context(|| format!("failed to seed category '{}'", name))?;
        ids.push(record.id);
    }
    Ok(ids)
}

/// Every fourth record is left uncategorized.
async fn seed_media(client: &impl DataGateway, categories: &[RecordId], count: usize) -> Result<Vec<Record>> {
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let kind = if i % 2 == 0 { EntityKind::Audio } else { EntityKind::Video };
        let mut payload = fields(&[
            ("name", Value::from(format!("Episode {:02}", i + 1))),
            ("duration", Value::from(30.0 + i as f64)),
        ]);
        if let Some(category) = categories.get(i % (categories.len() + 1)) {
            payload.insert("categoryId".to_string(), Value::from(*category));
        }
        records.push(client.create(kind, payload).await?);
    }
    Ok(records)
}

async fn mount_views(runtime: &MirrorRuntime, count: usize) -> Result<Vec<ViewHandle>> {
    let mut views = Vec::with_capacity(count);
    for i in 0..count {
        let kind = if i % 2 == 0 { EntityKind::Audio } else { EntityKind::Video };
        let sort = if i == 0 { SortOption::NameAsc } else { SortOption::default() };
        let options = runtime.view_options(kind).sort(sort);

        // the last view listens over the wire when there is more than one
        let view = if count > 1 && i == count - 1 {
            runtime.open_remote_view(options)
        } else {
            runtime.open_view(options)
        };
        settle(&view, |snapshot| !snapshot.loading).await?;
        views.push(view);
    }
    Ok(views)
}

async fn run_batch(runtime: &MirrorRuntime, size: usize) -> Result<()> {
    let hub = runtime.open_hub("batch");
    let payloads = (0..size)
        .map(|i| fields(&[("name", Value::from(format!("Batch take {:03}", i + 1)))]))
        .collect();

    let job = runtime
        .start_batch(&hub, EntityKind::Audio, payloads)
        .context("batch refused")?;

    let mut progress = job.progress();
    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            println!("batch progress {} ({:.0}%)", current, current.fraction() * 100.0);
            if current.is_complete() {
                break;
            }
        }
    });

    let summary = job.finish().await?;
    let _ = printer.await;
    println!(
        "batch settled: {} created, {} failed ({:?})",
        summary.succeeded.len(),
        summary.failures.len(),
        summary.outcome()
    );
    for failure in &summary.failures {
        println!("  item {}: {}", failure.index, failure.reason);
    }
    Ok(())
}

async fn run_transcription(client: &impl DataGateway, views: &[ViewHandle], target: &Record) -> Result<()> {
    let job = client
        .create(
            EntityKind::Transcription,
            fields(&[
                ("targetId", Value::from(target.id)),
                ("targetType", Value::from("Audio")),
                ("state", Value::from("pending")),
            ]),
        )
        .await
        .context("failed to queue the transcription")?;

    for state in ["processing", "finished"] {
        client
            .update(EntityKind::Transcription, job.id, fields(&[("state", Value::from(state))]))
            .await?;

        let flag = if state == "processing" { "transcribing" } else { "transcribed" };
        for view in views.iter().filter(|view| view.kind() == EntityKind::Audio) {
            if !view.snapshot().items.iter().any(|item| item.id == target.id) {
                continue;
            }
            settle(view, |snapshot| {
                snapshot
                    .items
                    .iter()
                    .any(|item| item.id == target.id && item.value(flag).as_bool())
            })
            .await?;
        }
        println!("transcription of '{}' is {}", target.name().unwrap_or_default(), state);
    }
    Ok(())
}

async fn settle(view: &ViewHandle, predicate: impl FnMut(&ViewSnapshot) -> bool) -> Result<ViewSnapshot> {
    let snapshot = tokio::time::timeout(SETTLE_TIMEOUT, view.wait_for(predicate))
        .await
        .with_context(|| format!("{} view did not settle", view.kind()))??;
    if let Some(err) = &snapshot.last_error {
        bail!("{} view failed: {}", view.kind(), err);
    }
    Ok(snapshot)
}

fn print_snapshot(snapshot: &ViewSnapshot) {
    println!(
        "\n{} view: {} rows, sort {:?}{}",
        snapshot.kind,
        snapshot.items.len(),
        snapshot.filters.sort,
        if snapshot.has_more { ", more available" } else { "" }
    );
    for item in &snapshot.items {
        let mut flags = Vec::new();
        if item.value("transcribing").as_bool() {
            flags.push("transcribing");
        }
        if item.value("transcribed").as_bool() {
            flags.push("transcribed");
        }
        println!("  {:<20} {}", item.name().unwrap_or("-"), flags.join(" "));
    }
    let categories = snapshot.lookup_names(EntityKind::Category);
    if !categories.is_empty() {
        println!("  categories: {}", categories.join(", "));
    }
}

fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}
