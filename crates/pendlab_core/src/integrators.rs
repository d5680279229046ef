use crate::traits::{FixedStep, PhaseSystem, Scalar};

/// Classic Runge-Kutta 4th order integrator.
///
/// Stage buffers are allocated once for a given phase dimension and reused
/// across steps, so the per-step cost is four derivative evaluations and no
/// allocation.
pub struct Rk4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Rk4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::from_f64(0.0).unwrap();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> FixedStep<T> for Rk4<T> {
    fn step(&mut self, system: &impl PhaseSystem<T>, t: &mut T, phase: &mut [T], dt: T) {
        let half = T::from_f64(0.5).unwrap();
        let sixth = T::from_f64(1.0 / 6.0).unwrap();
        let two = T::from_f64(2.0).unwrap();

        let t0 = *t;

        // k1 = f(t, y)
        system.derivative(t0, phase, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..phase.len() {
            self.tmp[i] = phase[i] + dt * self.k1[i] * half;
        }
        system.derivative(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..phase.len() {
            self.tmp[i] = phase[i] + dt * self.k2[i] * half;
        }
        system.derivative(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..phase.len() {
            self.tmp[i] = phase[i] + dt * self.k3[i];
        }
        system.derivative(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..phase.len() {
            phase[i] = phase[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Semi-implicit (symplectic) Euler for a `[q, v]` phase layout.
///
/// Velocities are kicked with the current acceleration first, then positions
/// drift with the updated velocities. One derivative evaluation per step;
/// lower accuracy than RK4 but better long-horizon energy behavior than
/// explicit Euler.
pub struct SemiImplicitEuler<T: Scalar> {
    deriv: Vec<T>,
}

impl<T: Scalar> SemiImplicitEuler<T> {
    pub fn new(dim: usize) -> Self {
        debug_assert!(dim % 2 == 0, "phase layout must be [q, v]");
        Self {
            deriv: vec![T::from_f64(0.0).unwrap(); dim],
        }
    }
}

impl<T: Scalar> FixedStep<T> for SemiImplicitEuler<T> {
    fn step(&mut self, system: &impl PhaseSystem<T>, t: &mut T, phase: &mut [T], dt: T) {
        let n = phase.len() / 2;
        system.derivative(*t, phase, &mut self.deriv);

        // v_{k+1} = v_k + dt * a_k, then q_{k+1} = q_k + dt * v_{k+1}
        for i in 0..n {
            phase[n + i] = phase[n + i] + dt * self.deriv[n + i];
        }
        for i in 0..n {
            phase[i] = phase[i] + dt * phase[n + i];
        }

        *t = *t + dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// dy/dt = rate * y, the usual linear probe system.
    struct Decay {
        rate: f64,
    }

    impl PhaseSystem<f64> for Decay {
        fn phase_dim(&self) -> usize {
            1
        }

        fn derivative(&self, _t: f64, y: &[f64], out: &mut [f64]) {
            out[0] = self.rate * y[0];
        }
    }

    /// Harmonic oscillator in [q, v] layout: qddot = -q.
    struct Oscillator;

    impl PhaseSystem<f64> for Oscillator {
        fn phase_dim(&self) -> usize {
            2
        }

        fn derivative(&self, _t: f64, y: &[f64], out: &mut [f64]) {
            out[0] = y[1];
            out[1] = -y[0];
        }
    }

    #[test]
    fn rk4_matches_exponential_decay() {
        let system = Decay { rate: -1.0 };
        let mut rk4 = Rk4::new(1);
        let mut t = 0.0;
        let mut y = [1.0];
        for _ in 0..100 {
            rk4.step(&system, &mut t, &mut y, 0.01);
        }
        assert!((t - 1.0).abs() < 1e-12);
        assert!((y[0] - (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn rk4_order_of_accuracy() {
        // Halving dt should shrink the error by roughly 2^4.
        let system = Decay { rate: -2.0 };
        let exact = (-2.0f64).exp();

        let mut errors = Vec::new();
        for &dt in &[0.1f64, 0.05] {
            let mut rk4 = Rk4::new(1);
            let mut t = 0.0;
            let mut y = [1.0];
            let steps = (1.0 / dt).round() as usize;
            for _ in 0..steps {
                rk4.step(&system, &mut t, &mut y, dt);
            }
            errors.push((y[0] - exact).abs());
        }
        assert!(errors[0] / errors[1] > 10.0);
    }

    #[test]
    fn semi_implicit_euler_bounds_oscillator_energy() {
        let mut euler = SemiImplicitEuler::new(2);
        let mut t = 0.0;
        let mut y = [1.0, 0.0];
        let energy = |y: &[f64]| 0.5 * (y[0] * y[0] + y[1] * y[1]);
        let e0 = energy(&y);
        for _ in 0..10_000 {
            euler.step(&Oscillator, &mut t, &mut y, 0.001);
        }
        // Symplectic: energy oscillates around the true value instead of
        // drifting off exponentially the way explicit Euler does.
        assert!((energy(&y) - e0).abs() < 1e-2 * e0);
    }
}
