use tracing::info;

/// Sweep-by-sweep loss bookkeeping for early stopping.
#[derive(Debug, Clone)]
pub struct ConvergenceState {
    check: bool,
    rate: f64,
    iteration: usize,
    curr_loss: f64,
    prev_average: f64,
    curr_average: f64,
}

impl ConvergenceState {
    pub fn new(check: bool, rate: f64) -> Self {
        Self {
            check,
            rate,
            iteration: 0,
            curr_loss: 0.0,
            prev_average: f64::INFINITY,
            curr_average: f64::INFINITY,
        }
    }

    /// Starts a new sweep.
    pub fn next(&mut self) {
        self.prev_average = self.curr_average;
        self.curr_loss = 0.0;
        self.iteration += 1;
    }

    pub fn incr_loss(&mut self, loss: f64) {
        self.curr_loss += loss;
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Average loss of the current sweep over `n` observations.
    pub fn average_loss(&self, n: u64) -> f64 {
        if n == 0 {
            0.0
        } else {
            self.curr_loss / n as f64
        }
    }

    /// Closes the current sweep with `n` observations and reports whether
    /// the relative improvement over the previous sweep fell below the
    /// configured rate. A loss increase never counts as converged.
    pub fn is_converged(&mut self, n: u64) -> bool {
        self.curr_average = self.average_loss(n);
        if !self.check || !self.prev_average.is_finite() {
            return false;
        }
        let (prev, curr) = (self.prev_average, self.curr_average);
        if curr > prev {
            info!(
                iteration = self.iteration,
                curr, prev, "loss increased, continuing"
            );
            return false;
        }
        let change = if prev == 0.0 { 0.0 } else { (prev - curr) / prev };
        if change < self.rate {
            info!(
                iteration = self.iteration,
                curr,
                prev,
                change,
                "training converged"
            );
            return true;
        }
        false
    }
}
