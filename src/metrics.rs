//! Simulation counters
//!
//! Atomic counters bumped from inside the tick through `&SimState`, plus a
//! plain-text render served by the headless binary.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

const TICK_HISTORY: usize = 1000;

#[derive(Debug)]
pub struct SimMetrics {
    // Counters
    pub ticks: AtomicU64,
    pub shots_fired: AtomicU64,
    pub projectiles_spawned: AtomicU64,
    pub kills: AtomicU64,
    pub path_replans: AtomicU64,
    pub unstuck_maneuvers: AtomicU64,

    // Gauges, refreshed once per tick
    pub characters_alive: AtomicU64,
    pub projectiles_live: AtomicU64,
    pub bot_players: AtomicU64,
    pub human_players: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,

    /// 0 = good, 1 = warning, 2 = critical
    pub performance_status: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            shots_fired: AtomicU64::new(0),
            projectiles_spawned: AtomicU64::new(0),
            kills: AtomicU64::new(0),
            path_replans: AtomicU64::new(0),
            unstuck_maneuvers: AtomicU64::new(0),
            characters_alive: AtomicU64::new(0),
            projectiles_live: AtomicU64::new(0),
            bot_players: AtomicU64::new(0),
            human_players: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            performance_status: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    #[inline]
    pub fn record_shot(&self) {
        self.shots_fired.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_projectile(&self) {
        self.projectiles_spawned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_kill(&self) {
        self.kills.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_replan(&self) {
        self.path_replans.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unstuck(&self) {
        self.unstuck_maneuvers.fetch_add(1, Ordering::Relaxed);
    }

    /// Per-tick gauge refresh
    pub fn set_population(&self, alive: usize, projectiles: usize, bots: usize, humans: usize) {
        self.characters_alive.store(alive as u64, Ordering::Relaxed);
        self.projectiles_live.store(projectiles as u64, Ordering::Relaxed);
        self.bot_players.store(bots as u64, Ordering::Relaxed);
        self.human_players.store(humans as u64, Ordering::Relaxed);
    }

    /// Record a tick time and update the percentile gauges
    pub fn record_tick(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            self.tick_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// `name value` lines, one per metric
    pub fn render(&self) -> String {
        let mut output = String::with_capacity(1024);

        macro_rules! metric {
            ($name:expr, $value:expr) => {
                output.push_str(&format!("{} {}\n", $name, $value));
            };
        }

        metric!("arena_sim_ticks_total", self.ticks.load(Ordering::Relaxed));
        metric!("arena_sim_shots_fired_total", self.shots_fired.load(Ordering::Relaxed));
        metric!(
            "arena_sim_projectiles_spawned_total",
            self.projectiles_spawned.load(Ordering::Relaxed)
        );
        metric!("arena_sim_kills_total", self.kills.load(Ordering::Relaxed));
        metric!("arena_sim_path_replans_total", self.path_replans.load(Ordering::Relaxed));
        metric!(
            "arena_sim_unstuck_maneuvers_total",
            self.unstuck_maneuvers.load(Ordering::Relaxed)
        );
        metric!("arena_sim_characters_alive", self.characters_alive.load(Ordering::Relaxed));
        metric!("arena_sim_projectiles_live", self.projectiles_live.load(Ordering::Relaxed));
        metric!("arena_sim_players_bot", self.bot_players.load(Ordering::Relaxed));
        metric!("arena_sim_players_human", self.human_players.load(Ordering::Relaxed));
        metric!("arena_sim_tick_time_microseconds", self.tick_time_us.load(Ordering::Relaxed));
        metric!(
            "arena_sim_tick_time_p95_microseconds",
            self.tick_time_p95_us.load(Ordering::Relaxed)
        );
        metric!(
            "arena_sim_tick_time_max_microseconds",
            self.tick_time_max_us.load(Ordering::Relaxed)
        );
        metric!(
            "arena_sim_performance_status",
            self.performance_status.load(Ordering::Relaxed)
        );
        metric!("arena_sim_uptime_seconds", self.uptime_seconds());

        output
    }
}

impl Default for SimMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve `render()` over bare HTTP
#[cfg(feature = "metrics_endpoint")]
pub async fn start_metrics_server(
    metrics: std::sync::Arc<SimMetrics>,
    port: u16,
) -> anyhow::Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tracing::{debug, info};

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = if request.starts_with("GET /metrics") {
                        let body = metrics.render();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /health") {
                        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK".to_string()
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("Failed to read from metrics socket {}: {}", peer, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = SimMetrics::new();
        assert_eq!(metrics.ticks.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.kills.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_percentiles() {
        let metrics = SimMetrics::new();
        for i in 0..100 {
            metrics.record_tick(Duration::from_micros(100 + i * 10));
        }
        assert_eq!(metrics.ticks.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1000);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_render_lines() {
        let metrics = SimMetrics::new();
        metrics.record_shot();
        metrics.record_shot();
        metrics.record_kill();
        metrics.record_unstuck();
        metrics.set_population(3, 7, 2, 1);

        let output = metrics.render();
        assert!(output.contains("arena_sim_shots_fired_total 2\n"));
        assert!(output.contains("arena_sim_kills_total 1\n"));
        assert!(output.contains("arena_sim_unstuck_maneuvers_total 1\n"));
        assert!(output.contains("arena_sim_projectiles_live 7\n"));
        assert!(output.lines().all(|l| l.split(' ').count() == 2));
    }
}
