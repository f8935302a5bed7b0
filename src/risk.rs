// ===============================
// src/risk.rs
// ===============================
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::RiskLimits;
use crate::domain::Side;
use crate::ledger::{Ledger, PnlDelta};
use crate::metrics::{CIRCUIT_BREAKER, RISK_REJECTS, RISK_WARNINGS};

const POSITION_WARN_UTILIZATION: Decimal = dec!(0.8);
const LOSS_WARN_UTILIZATION: Decimal = dec!(0.7);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("circuit breaker active: {0}")]
    CircuitBreaker(String),
    #[error("position limit exceeded")]
    PositionLimit,
    #[error("daily loss limit exceeded")]
    DailyLoss,
    #[error("drawdown limit exceeded")]
    Drawdown,
    #[error("order rate limit exceeded")]
    RateLimit,
}

impl RejectReason {
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::CircuitBreaker(_) => "circuit_breaker",
            RejectReason::PositionLimit => "position_limit",
            RejectReason::DailyLoss => "daily_loss",
            RejectReason::Drawdown => "drawdown",
            RejectReason::RateLimit => "rate_limit",
        }
    }
}

struct FinancialState {
    daily_pnl: Decimal,
    peak_pnl: Decimal,
    day: NaiveDate,
    loss_warned: bool,
}

/// Pre-trade gate and periodic monitor. The order manager holds this by
/// capability and consults `may_place` before every submission; the ledger's
/// PnL deltas arrive through `on_pnl_delta`.
pub struct RiskSupervisor {
    limits: RiskLimits,
    breaker: AtomicBool,
    breaker_reason: Mutex<String>,
    fin: Mutex<FinancialState>,
    submissions: Mutex<VecDeque<DateTime<Utc>>>,
}

impl RiskSupervisor {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            breaker: AtomicBool::new(false),
            breaker_reason: Mutex::new(String::new()),
            fin: Mutex::new(FinancialState {
                daily_pnl: Decimal::ZERO,
                peak_pnl: Decimal::ZERO,
                day: Utc::now().date_naive(),
                loss_warned: false,
            }),
            submissions: Mutex::new(VecDeque::new()),
        }
    }

    /// The three pre-trade checks: breaker, projected position, financial
    /// limits, rolling order rate. First failure wins.
    pub fn may_place(&self, side: Side, qty: Decimal, net_position: Decimal) -> Result<(), RejectReason> {
        if self.breaker.load(Ordering::Acquire) {
            let reason = self.breaker_reason.lock().expect("breaker lock").clone();
            return self.reject(RejectReason::CircuitBreaker(reason));
        }

        let projected = net_position + side.signed(qty);
        if projected.abs() > self.limits.position_limit {
            return self.reject(RejectReason::PositionLimit);
        }

        {
            let fin = self.fin.lock().expect("fin lock");
            if fin.daily_pnl <= self.limits.daily_loss_limit {
                drop(fin);
                self.trip("daily loss limit exceeded");
                return self.reject(RejectReason::DailyLoss);
            }
            if fin.peak_pnl - fin.daily_pnl >= self.limits.drawdown_limit {
                drop(fin);
                self.trip("drawdown limit exceeded");
                return self.reject(RejectReason::Drawdown);
            }
        }

        {
            let mut subs = self.submissions.lock().expect("submissions lock");
            prune_window(&mut subs, Utc::now());
            if subs.len() as u32 >= self.limits.order_rate_limit {
                return self.reject(RejectReason::RateLimit);
            }
        }

        Ok(())
    }

    fn reject(&self, reason: RejectReason) -> Result<(), RejectReason> {
        RISK_REJECTS.with_label_values(&[reason.label()]).inc();
        Err(reason)
    }

    /// Record an accepted submission into the rolling rate window.
    pub fn record_submission(&self) {
        let mut subs = self.submissions.lock().expect("submissions lock");
        let now = Utc::now();
        subs.push_back(now);
        prune_window(&mut subs, now);
    }

    /// Ledger callback: fold the realized delta into the daily PnL, track the
    /// peak, and trip the breaker on a breach.
    pub fn on_pnl_delta(&self, delta: PnlDelta) {
        let (breach, warn_loss) = {
            let mut fin = self.fin.lock().expect("fin lock");
            fin.daily_pnl += delta.realized_delta;
            if fin.daily_pnl > fin.peak_pnl {
                fin.peak_pnl = fin.daily_pnl;
            }

            let breach = if fin.daily_pnl <= self.limits.daily_loss_limit {
                Some("daily loss limit exceeded")
            } else if fin.peak_pnl - fin.daily_pnl >= self.limits.drawdown_limit {
                Some("drawdown limit exceeded")
            } else {
                None
            };

            let warn_threshold = self.limits.daily_loss_limit * LOSS_WARN_UTILIZATION;
            let warn_loss = if breach.is_none() && fin.daily_pnl <= warn_threshold && !fin.loss_warned {
                fin.loss_warned = true;
                Some(fin.daily_pnl)
            } else {
                None
            };
            (breach, warn_loss)
        };

        if let Some(reason) = breach {
            self.trip(reason);
        }
        if let Some(pnl) = warn_loss {
            RISK_WARNINGS.with_label_values(&["daily_loss"]).inc();
            warn!(daily_pnl = %pnl, limit = %self.limits.daily_loss_limit, "approaching daily loss limit");
        }
    }

    pub fn trip(&self, reason: &str) {
        if !self.limits.circuit_breaker_enabled {
            return;
        }
        if !self.breaker.swap(true, Ordering::AcqRel) {
            *self.breaker_reason.lock().expect("breaker lock") = reason.to_string();
            CIRCUIT_BREAKER.set(1);
            error!(%reason, "circuit breaker tripped");
        }
    }

    /// Explicit operator action; there is no automatic reset.
    pub fn reset(&self) {
        self.breaker.store(false, Ordering::Release);
        self.breaker_reason.lock().expect("breaker lock").clear();
        CIRCUIT_BREAKER.set(0);
        info!("circuit breaker reset");
    }

    pub fn breaker_active(&self) -> bool {
        self.breaker.load(Ordering::Acquire)
    }

    pub fn breaker_reason(&self) -> String {
        self.breaker_reason.lock().expect("breaker lock").clone()
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.fin.lock().expect("fin lock").daily_pnl
    }

    /// Periodic housekeeping: rolling-window pruning, position-utilization
    /// warnings, and the UTC-midnight daily reset. The breaker stays latched
    /// across the reset.
    pub fn poll(&self, ledger: &Ledger) {
        let now = Utc::now();

        {
            let mut fin = self.fin.lock().expect("fin lock");
            let today = now.date_naive();
            if today != fin.day {
                info!(day = %today, "daily risk counters reset");
                fin.day = today;
                fin.daily_pnl = Decimal::ZERO;
                fin.peak_pnl = Decimal::ZERO;
                fin.loss_warned = false;
                self.submissions.lock().expect("submissions lock").clear();
            }
        }

        {
            let mut subs = self.submissions.lock().expect("submissions lock");
            prune_window(&mut subs, now);
        }

        let position = ledger.net_position();
        if self.limits.position_limit > Decimal::ZERO {
            let utilization = position.abs() / self.limits.position_limit;
            if utilization >= POSITION_WARN_UTILIZATION && utilization <= Decimal::ONE {
                RISK_WARNINGS.with_label_values(&["position"]).inc();
                warn!(%position, limit = %self.limits.position_limit, "position utilization high");
            }
        }
    }
}

fn prune_window(subs: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - chrono::Duration::seconds(1);
    while subs.front().map_or(false, |t| *t <= cutoff) {
        subs.pop_front();
    }
}

/// Risk worker: periodic monitor over ledger state and the rolling counters.
pub async fn run(risk: Arc<RiskSupervisor>, ledger: Arc<Ledger>, mut stop_rx: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_millis(100));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => risk.poll(&ledger),
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}
