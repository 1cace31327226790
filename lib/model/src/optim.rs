//! Adam optimizer over ndarray parameter tensors

use ndarray::{ArrayViewD, ArrayViewMutD};

/// Adam with bias-corrected moment estimates.
///
/// Moment buffers are allocated lazily on the first step, one slot per
/// parameter tensor. Tensors must be passed in the same order every step.
#[derive(Debug, Clone)]
pub struct Adam {
    /// Learning rate (step size)
    learning_rate: f32,
    /// Decay rate for first moment estimates (default: 0.9)
    beta1: f32,
    /// Decay rate for second moment estimates (default: 0.999)
    beta2: f32,
    /// Numerical stability constant (default: 1e-8)
    epsilon: f32,
    slots: Vec<Moments>,
    t: i32,
}

#[derive(Debug, Clone)]
struct Moments {
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            slots: Vec::new(),
            t: 0,
        }
    }

    /// Number of steps taken so far
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Apply one update to every `(parameter, gradient)` pair
    pub fn step<'a, I>(&mut self, params: I)
    where
        I: IntoIterator<Item = (ArrayViewMutD<'a, f32>, ArrayViewD<'a, f32>)>,
    {
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);

        for (slot_idx, (mut param, grad)) in params.into_iter().enumerate() {
            if self.slots.len() <= slot_idx {
                self.slots.push(Moments {
                    m: vec![0.0; param.len()],
                    v: vec![0.0; param.len()],
                });
            }
            let slot = &mut self.slots[slot_idx];
            debug_assert_eq!(slot.m.len(), param.len());
            debug_assert_eq!(grad.len(), param.len());

            for (((p, &g), m), v) in param
                .iter_mut()
                .zip(grad.iter())
                .zip(slot.m.iter_mut())
                .zip(slot.v.iter_mut())
            {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        }
    }
}
