use std::f32::consts::PI;

use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    QuadraticIn,
    QuadraticOut,
    QuadraticInOut,
    CubicIn,
    CubicOut,
    CubicInOut,
    QuarticIn,
    QuarticOut,
    QuarticInOut,
    SinusoidalInOut,
    ExponentialInOut,
}

impl Easing {
    /// Maps linear progress in `[0, 1]` onto the curve.
    pub fn ease(self, k: f32) -> f32 {
        let k = k.clamp(0.0, 1.0);
        match self {
            Self::Linear => k,
            Self::QuadraticIn => k * k,
            Self::QuadraticOut => k * (2.0 - k),
            Self::QuadraticInOut => {
                let k = k * 2.0;
                if k < 1.0 {
                    0.5 * k * k
                } else {
                    let k = k - 1.0;
                    -0.5 * (k * (k - 2.0) - 1.0)
                }
            }
            Self::CubicIn => k * k * k,
            Self::CubicOut => {
                let k = k - 1.0;
                k * k * k + 1.0
            }
            Self::CubicInOut => {
                let k = k * 2.0;
                if k < 1.0 {
                    0.5 * k * k * k
                } else {
                    let k = k - 2.0;
                    0.5 * (k * k * k + 2.0)
                }
            }
            Self::QuarticIn => k * k * k * k,
            Self::QuarticOut => {
                let k = k - 1.0;
                1.0 - k * k * k * k
            }
            Self::QuarticInOut => {
                let k = k * 2.0;
                if k < 1.0 {
                    0.5 * k * k * k * k
                } else {
                    let k = k - 2.0;
                    -0.5 * (k * k * k * k - 2.0)
                }
            }
            Self::SinusoidalInOut => 0.5 * (1.0 - (PI * k).cos()),
            Self::ExponentialInOut => {
                if k == 0.0 {
                    0.0
                } else if k == 1.0 {
                    1.0
                } else {
                    let k = k * 2.0;
                    if k < 1.0 {
                        0.5 * 1024f32.powf(k - 1.0)
                    } else {
                        0.5 * (-(2f32.powf(-10.0 * (k - 1.0))) + 2.0)
                    }
                }
            }
        }
    }
}

/// Values a tween can move between.
pub trait Interpolate: Copy {
    fn interpolate(&self, to: &Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(&self, to: &Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

impl Interpolate for Vec3 {
    fn interpolate(&self, to: &Self, t: f32) -> Self {
        self.lerp(*to, t)
    }
}

impl Interpolate for Quat {
    fn interpolate(&self, to: &Self, t: f32) -> Self {
        self.slerp(*to, t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenStatus {
    /// Not started yet.
    Idle,
    /// Started but still inside its delay.
    Waiting,
    Running,
    Finished,
}

#[derive(Debug, Clone)]
pub struct Tween<T: Interpolate> {
    pub from: T,
    pub to: T,
    /// Seconds.
    pub duration: f32,
    /// Seconds before the value starts moving.
    pub delay: f32,
    pub easing: Easing,
    elapsed: f32,
    status: TweenStatus,
}

impl<T: Interpolate> Tween<T> {
    pub fn new(from: T, to: T, duration: f32) -> Self {
        Self {
            from,
            to,
            duration,
            delay: 0.0,
            easing: Easing::Linear,
            elapsed: 0.0,
            status: TweenStatus::Idle,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn with_delay(mut self, delay: f32) -> Self {
        self.delay = delay.max(0.0);
        self
    }

    pub fn start(&mut self) {
        self.elapsed = 0.0;
        self.status = if self.delay > 0.0 {
            TweenStatus::Waiting
        } else {
            TweenStatus::Running
        };
    }

    pub fn status(&self) -> TweenStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status == TweenStatus::Finished
    }

    /// Advances by `dt` seconds and reports the new status.
    pub fn update(&mut self, dt: f32) -> TweenStatus {
        if matches!(self.status, TweenStatus::Idle | TweenStatus::Finished) {
            return self.status;
        }
        self.elapsed += dt.max(0.0);
        self.status = if self.elapsed < self.delay {
            TweenStatus::Waiting
        } else if self.elapsed - self.delay >= self.duration {
            TweenStatus::Finished
        } else {
            TweenStatus::Running
        };
        self.status
    }

    /// Linear progress in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        match self.status {
            TweenStatus::Idle | TweenStatus::Waiting => 0.0,
            TweenStatus::Finished => 1.0,
            TweenStatus::Running if self.duration <= 0.0 => 1.0,
            TweenStatus::Running => ((self.elapsed - self.delay) / self.duration).clamp(0.0, 1.0),
        }
    }

    pub fn value(&self) -> T {
        match self.status {
            TweenStatus::Finished => self.to,
            _ => self.from.interpolate(&self.to, self.easing.ease(self.progress())),
        }
    }

    /// Seconds left over after finishing, handed to a chained tween.
    fn overshoot(&self) -> f32 {
        (self.elapsed - self.delay - self.duration).max(0.0)
    }
}

/// Tweens that run one after another, each starting when the previous ends.
#[derive(Debug, Clone)]
pub struct TweenSequence<T: Interpolate> {
    tweens: Vec<Tween<T>>,
    current: usize,
}

impl<T: Interpolate> TweenSequence<T> {
    pub fn new(first: Tween<T>) -> Self {
        Self {
            tweens: vec![first],
            current: 0,
        }
    }

    pub fn chain(mut self, next: Tween<T>) -> Self {
        self.tweens.push(next);
        self
    }

    pub fn start(&mut self) {
        self.current = 0;
        if let Some(first) = self.tweens.first_mut() {
            first.start();
        }
    }

    pub fn update(&mut self, dt: f32) -> TweenStatus {
        let mut dt = dt;
        loop {
            let is_last = self.current + 1 == self.tweens.len();
            let Some(tween) = self.tweens.get_mut(self.current) else {
                return TweenStatus::Finished;
            };
            let status = tween.update(dt);
            if status != TweenStatus::Finished {
                return status;
            }
            if is_last {
                return TweenStatus::Finished;
            }
            dt = tween.overshoot();
            self.current += 1;
            self.tweens[self.current].start();
        }
    }

    pub fn value(&self) -> T {
        let index = self.current.min(self.tweens.len() - 1);
        self.tweens[index].value()
    }

    pub fn is_finished(&self) -> bool {
        self.current + 1 == self.tweens.len() && self.tweens[self.current].is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Easing; 12] = [
        Easing::Linear,
        Easing::QuadraticIn,
        Easing::QuadraticOut,
        Easing::QuadraticInOut,
        Easing::CubicIn,
        Easing::CubicOut,
        Easing::CubicInOut,
        Easing::QuarticIn,
        Easing::QuarticOut,
        Easing::QuarticInOut,
        Easing::SinusoidalInOut,
        Easing::ExponentialInOut,
    ];

    #[test]
    fn easing_curves_hit_both_ends() {
        for easing in ALL {
            assert!(easing.ease(0.0).abs() < 1e-3, "{easing:?} at 0");
            assert!((easing.ease(1.0) - 1.0).abs() < 1e-6, "{easing:?} at 1");
        }
    }

    #[test]
    fn in_out_curves_are_symmetric_at_midpoint() {
        for easing in [
            Easing::QuadraticInOut,
            Easing::CubicInOut,
            Easing::QuarticInOut,
            Easing::SinusoidalInOut,
            Easing::ExponentialInOut,
        ] {
            assert!((easing.ease(0.5) - 0.5).abs() < 1e-6, "{easing:?}");
        }
        assert!((Easing::QuadraticInOut.ease(0.25) - 0.125).abs() < 1e-6);
    }

    #[test]
    fn tween_runs_for_its_duration() {
        let mut tween = Tween::new(0.0f32, 10.0, 2.0);
        assert_eq!(tween.update(1.0), TweenStatus::Idle);
        tween.start();
        assert_eq!(tween.update(1.0), TweenStatus::Running);
        assert!((tween.value() - 5.0).abs() < 1e-6);
        assert_eq!(tween.update(1.5), TweenStatus::Finished);
        assert_eq!(tween.value(), 10.0);
    }

    #[test]
    fn delay_holds_the_start_value() {
        let mut tween = Tween::new(Vec3::ZERO, Vec3::ONE, 1.0).with_delay(0.5);
        tween.start();
        assert_eq!(tween.update(0.25), TweenStatus::Waiting);
        assert_eq!(tween.value(), Vec3::ZERO);
        tween.update(0.75);
        assert!((tween.value() - Vec3::splat(0.5)).length() < 1e-6);
    }

    #[test]
    fn quaternions_slerp() {
        let to = Quat::from_rotation_y(PI / 2.0);
        let mut tween = Tween::new(Quat::IDENTITY, to, 1.0);
        tween.start();
        tween.update(0.5);
        let half = Quat::from_rotation_y(PI / 4.0);
        assert!(tween.value().angle_between(half) < 1e-4);
    }

    #[test]
    fn zero_duration_finishes_immediately() {
        let mut tween = Tween::new(1.0f32, 2.0, 0.0);
        tween.start();
        assert_eq!(tween.update(0.0), TweenStatus::Finished);
        assert_eq!(tween.value(), 2.0);
    }

    #[test]
    fn chained_tweens_hand_over_leftover_time() {
        let mut sequence =
            TweenSequence::new(Tween::new(0.0f32, 1.0, 1.0)).chain(Tween::new(1.0, 3.0, 1.0));
        sequence.start();
        assert_eq!(sequence.update(1.5), TweenStatus::Running);
        assert!((sequence.value() - 2.0).abs() < 1e-6);
        assert_eq!(sequence.update(1.0), TweenStatus::Finished);
        assert!(sequence.is_finished());
        assert_eq!(sequence.value(), 3.0);
    }

    #[test]
    fn one_long_step_runs_through_the_whole_sequence() {
        let mut sequence = TweenSequence::new(Tween::new(0.0f32, 1.0, 1.0))
            .chain(Tween::new(1.0, 2.0, 1.0))
            .chain(Tween::new(2.0, 5.0, 1.0));
        sequence.start();
        assert_eq!(sequence.update(10.0), TweenStatus::Finished);
        assert!(sequence.is_finished());
        assert_eq!(sequence.value(), 5.0);
        assert_eq!(sequence.update(1.0), TweenStatus::Finished);
    }
}
