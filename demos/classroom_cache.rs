//! # Classroom Cache Example
//!
//! Walks through the cached repository with the in-memory data source:
//! - Cold read vs warm read timing
//! - Include order and the cache key it produces
//! - Namespace invalidation on commit
//!
//! Set `CACHEHAUS_CONFIG` to point at a `cachehaus.toml` to try the Redis backend.

use cachehaus::prelude::*;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classroom {
    pub id: i64,
    pub name: String,
    pub capacity: i64,
    #[serde(default)]
    pub students: Vec<String>,
}

impl Entity for Classroom {
    fn kind() -> &'static str {
        "Classroom"
    }

    fn key(&self) -> KeyValue {
        KeyValue::Numeric(self.id)
    }

    fn navigations() -> &'static [&'static str] {
        &["Students"]
    }

    fn clear_navigation(&mut self, path: &str) {
        if path == "Students" {
            self.students.clear();
        }
    }
}

fn classroom(id: i64, name: &str, capacity: i64, students: &[&str]) -> Classroom {
    Classroom {
        id,
        name: name.to_string(),
        capacity,
        students: students.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("🚀 CacheHaus Classroom Example");
    println!("==============================");

    let config = match std::env::var("CACHEHAUS_CONFIG") {
        Ok(_) => AppConfig::load()?,
        Err(_) => AppConfig::default(),
    };
    let haus = CacheHaus::new(config)?;
    haus.health_check().await?;
    println!("✅ Cache backend ready ({:?})", haus.config().cache.backend);

    let table = InMemoryTable::with_rows([
        classroom(1, "Math", 30, &["Ada", "Alan"]),
        classroom(2, "Physics", 24, &["Marie"]),
        classroom(3, "Chemistry", 18, &[]),
    ]);
    let latency = Duration::from_millis(150);
    let classrooms = haus.wrap(InMemoryDataSource::new(table.clone()).with_latency(latency));

    println!("\n📖 Reading through the cache");
    println!("----------------------------");

    let started = Instant::now();
    let cold = classrooms.select_all().await?;
    println!("Cold read: {} classrooms in {:?}", cold.len(), started.elapsed());

    let started = Instant::now();
    let warm = classrooms.select_all().await?;
    println!("Warm read: {} classrooms in {:?}", warm.len(), started.elapsed());

    let by_students = ListQuery::new().include("Students");
    let with_students = classrooms.select_list(&by_students).await?;
    for room in &with_students {
        println!("  {} ({} seats): {:?}", room.name, room.capacity, room.students);
    }
    let key = haus.repository_cache().key_builder().build(
        Classroom::kind(),
        "select_list",
        &KeyParams::query(&by_students),
    );
    println!("Cache key: {}", key);

    let large = ListQuery::filtered(Predicate::gte("capacity", 20));
    println!("Rooms with 20+ seats: {}", classrooms.count(&large).await?);

    let page = classrooms
        .select_page(&ListQuery::new(), &PageRequest::new(0, 2).sorted_by(SortSpec::asc("name")))
        .await?;
    println!(
        "Page 1 of {}: {:?}",
        page.total_pages(),
        page.items.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
    );

    println!("\n✏️  Writing and committing");
    println!("-------------------------");

    classrooms.insert(classroom(4, "Biology", 26, &["Charles"])).await?;
    let changes = classrooms.commit().await?;
    println!("Committed {} change(s); Classroom namespace invalidated", changes);

    let started = Instant::now();
    let refreshed = classrooms.select_all().await?;
    println!("Refetched {} classrooms in {:?}", refreshed.len(), started.elapsed());
    println!("Data source reads so far: {}", classrooms.source().read_count());

    if let Some(memory) = haus.repository_cache().store().inner().as_memory() {
        let stats = memory.stats();
        println!(
            "\n📊 Cache stats: {} hits, {} misses, hit rate {:.0}%",
            stats.hits,
            stats.misses,
            stats.hit_rate() * 100.0
        );
    }

    Ok(())
}
