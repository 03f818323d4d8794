// PID thermostat core. Owned by the thermostat loop; never shared.
use crate::config::PidConfig;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

impl From<&PidConfig> for PidGains {
    fn from(config: &PidConfig) -> Self {
        Self::new(config.kp, config.ki, config.kd)
    }
}

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,

    /// PID state
    integral: f64,
    previous_error: f64,
    previous_time: Option<Instant>,
    last_output: f64,

    /// Output and anti-windup bounds
    integral_limit: f64,
    output_min: f64,
    output_max: f64,
}

impl PidController {
    pub fn new(gains: PidGains, integral_limit: f64, output_min: f64, output_max: f64) -> Self {
        Self {
            gains,
            integral: 0.0,
            previous_error: 0.0,
            previous_time: None,
            last_output: 0.0,
            integral_limit: integral_limit.abs(),
            output_min,
            output_max,
        }
    }

    pub fn from_config(config: &PidConfig) -> Self {
        Self::new(
            PidGains::from(config),
            config.integral_limit,
            config.output_min,
            config.output_max,
        )
    }

    /// Calculate the bounded control output for one sample.
    ///
    /// A zero `elapsed` leaves the integral and derivative state untouched and
    /// yields the proportional term alone.
    pub fn compute(&mut self, setpoint: f64, measurement: f64, elapsed: Duration) -> f64 {
        let error = setpoint - measurement;
        let dt = elapsed.as_secs_f64();

        if dt <= 0.0 {
            let output = self.clamp_output(self.gains.kp * error);
            self.last_output = output;
            return output;
        }

        self.integral = (self.integral + error * dt).clamp(-self.integral_limit, self.integral_limit);
        let derivative = (error - self.previous_error) / dt;
        self.previous_error = error;

        let raw = self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative;
        let output = self.clamp_output(raw);
        self.last_output = output;
        output
    }

    /// Like [`compute`](Self::compute) but derives the elapsed time from the
    /// previous sample instant. The first sample only sees the proportional term.
    pub fn update(&mut self, setpoint: f64, measurement: f64, now: Instant) -> f64 {
        let elapsed = self
            .previous_time
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or(Duration::ZERO);
        self.previous_time = Some(now);
        self.compute(setpoint, measurement, elapsed)
    }

    fn clamp_output(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.output_min;
        }
        value.clamp(self.output_min, self.output_max)
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
        tracing::debug!("PID gains set: Kp={:.3}, Ki={:.3}, Kd={:.3}", gains.kp, gains.ki, gains.kd);
    }

    pub fn set_p(&mut self, kp: f64) {
        self.gains.kp = kp;
    }

    pub fn set_i(&mut self, ki: f64) {
        self.gains.ki = ki;
    }

    pub fn set_d(&mut self, kd: f64) {
        self.gains.kd = kd;
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn integral_limit(&self) -> f64 {
        self.integral_limit
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    /// Reset PID controller
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.previous_time = None;
        self.last_output = 0.0;
    }
}
