use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, Result, SatchelError};
use crate::credentials::CredentialsProvider;
use crate::daemon::{WatchConfig, Watcher};
use crate::domain::{ContentType, SyncMode, SyncScope, SyncTask, TaskState};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn login(
    ctx: &AppContext,
    credentials: &dyn CredentialsProvider,
    user: &str,
) -> Result<()> {
    let session = ctx.sessions.get(user, credentials).await?;
    println!(
        "Logged in as {} (session {}, since {})",
        user,
        session.state(),
        session.created_at().format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

pub async fn sync(
    ctx: &AppContext,
    user: &str,
    course: Option<&str>,
    refresh: bool,
) -> Result<()> {
    let scope = match course {
        Some(course_id) => SyncScope::course(user, course_id),
        None => SyncScope::all_courses(user),
    };
    let mode = if refresh {
        SyncMode::Refresh
    } else {
        SyncMode::Incremental
    };
    let task_id = ctx.tasks.start(scope.with_mode(mode));
    println!("Started sync task {}", task_id);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_done = 0;
    let task = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                if ctx.tasks.cancel(&task_id) {
                    println!("Canceling after the current item...");
                }
                break ctx.tasks.wait(&task_id).await?;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let task = ctx.tasks.status(&task_id)?;
                if task.state.is_terminal() {
                    break task;
                }
                if task.courses_done > last_done {
                    last_done = task.courses_done;
                    println!("  {}/{} courses done", task.courses_done, task.courses_total);
                }
            }
        }
    };

    print_task(&task);
    ctx.sessions.close_all().await;
    Ok(())
}

fn print_task(task: &SyncTask) {
    for (content_type, counters) in &task.counters {
        println!("  {:<10} {}", content_type.as_str(), counters);
    }
    if task.course_errors > 0 {
        println!("  {} course(s) could not be opened", task.course_errors);
    }
    match task.state {
        TaskState::Failed => eprintln!(
            "Sync failed: {}",
            task.error.as_deref().unwrap_or("unknown error")
        ),
        state => {
            let totals = task.totals();
            println!(
                "Sync {}: {} new items, {} errors",
                state, totals.new, totals.errors
            );
        }
    }
}

pub async fn list_courses(
    ctx: &AppContext,
    credentials: &dyn CredentialsProvider,
    user: &str,
) -> Result<()> {
    let session = ctx.sessions.get(user, credentials).await?;
    let courses = ctx.navigation.list_courses(&session).await?;
    ctx.store.upsert_courses(user, &courses)?;

    if courses.is_empty() {
        println!("No courses");
    }
    for course in courses {
        println!("{}  {}", course.id, course.title);
    }
    ctx.sessions.close_all().await;
    Ok(())
}

pub fn list_items(ctx: &AppContext, course: &str, content_type: Option<ContentType>) -> Result<()> {
    let items = ctx.store.items_for_course(course, content_type)?;

    if items.is_empty() {
        println!("No items");
        return Ok(());
    }

    for item in items {
        let when = item.posted_at.as_deref().unwrap_or("-");
        println!(
            "[{}] {} #{} ({})",
            item.key.content_type,
            item.display_title(),
            item.key.remote_id,
            when
        );
        for attachment in &item.attachments {
            println!(
                "    {} ({} bytes) -> {}",
                attachment.key.file_name, attachment.byte_len, attachment.storage_ref
            );
        }
    }

    Ok(())
}

pub async fn watch(
    ctx: Arc<AppContext>,
    user: &str,
    interval: &str,
    no_initial_sync: bool,
) -> Result<()> {
    let interval_secs = WatchConfig::parse_interval(interval).map_err(SatchelError::Config)?;
    let config = WatchConfig {
        interval_secs,
        sync_on_start: !no_initial_sync,
    };

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        on_signal.cancel();
    });

    Watcher::new(ctx, config, user).run(shutdown).await
}
