// Small demo of the pool: a few worker threads sharing three "connections".

use borrowpool::{FactoryError, ObjectFactory, ObjectPool, PoolConfiguration, PooledEntry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

struct Connection {
    id: usize,
}

struct ConnectionFactory {
    next_id: AtomicUsize,
}

impl ObjectFactory<Connection> for ConnectionFactory {
    fn create_object(&self) -> Result<Connection, FactoryError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        println!("  opening connection {id}");
        Ok(Connection { id })
    }

    fn destroy_object(&self, entry: &PooledEntry<Connection>) -> Result<(), FactoryError> {
        println!("  closing connection {}", entry.object().id);
        Ok(())
    }
}

fn main() {
    let config = PoolConfiguration::new()
        .with_max_total(3)
        .with_max_free(2)
        .with_min_free(1)
        .with_max_wait_time(Duration::from_secs(2))
        .with_idle_timeout(Duration::from_millis(200))
        .with_eviction_interval(Duration::from_millis(100));
    let pool = match ObjectPool::new(
        ConnectionFactory {
            next_id: AtomicUsize::new(0),
        },
        config,
    ) {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return;
        }
    };

    let workers: Vec<_> = (0..6)
        .map(|worker| {
            let pool = pool.clone();
            thread::spawn(move || match pool.get_object() {
                Ok(conn) => {
                    println!("  worker {worker} using connection {}", conn.id);
                    thread::sleep(Duration::from_millis(50));
                }
                Err(err) => println!("  worker {worker} failed: {err}"),
            })
        })
        .collect();
    for worker in workers {
        let _ = worker.join();
    }

    println!("  created: {}, idle: {}", pool.created_count(), pool.free_count());
    thread::sleep(Duration::from_millis(500));
    println!("  idle after eviction: {}", pool.free_count());

    pool.close();
}
