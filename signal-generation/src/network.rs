// Dense feed-forward network with dropout, trained by Adam on binary cross-entropy

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;
/// Probabilities are clipped away from 0 and 1 before taking logs
const LOG_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Relu => z.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
        }
    }
}

/// Fully connected layer; weights are row-major `[outputs][inputs]`
#[derive(Debug, Clone)]
struct Dense {
    inputs: usize,
    outputs: usize,
    weights: Vec<f64>,
    biases: Vec<f64>,
    activation: Activation,
    /// Dropout rate applied to this layer's output during training
    dropout: f64,
    adam: AdamState,
}

#[derive(Debug, Clone)]
struct AdamState {
    m_weights: Vec<f64>,
    v_weights: Vec<f64>,
    m_biases: Vec<f64>,
    v_biases: Vec<f64>,
}

impl AdamState {
    fn new(weights: usize, biases: usize) -> Self {
        Self {
            m_weights: vec![0.0; weights],
            v_weights: vec![0.0; weights],
            m_biases: vec![0.0; biases],
            v_biases: vec![0.0; biases],
        }
    }
}

impl Dense {
    /// Glorot-uniform weights, zero biases
    fn new(
        inputs: usize,
        outputs: usize,
        activation: Activation,
        dropout: f64,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = (0..inputs * outputs)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();

        Self {
            inputs,
            outputs,
            weights,
            biases: vec![0.0; outputs],
            activation,
            dropout,
            adam: AdamState::new(inputs * outputs, outputs),
        }
    }

    fn pre_activation(&self, input: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|o| {
                let row = &self.weights[o * self.inputs..(o + 1) * self.inputs];
                row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + self.biases[o]
            })
            .collect()
    }
}

/// Per-layer values kept from the forward pass for backpropagation
struct LayerTrace {
    input: Vec<f64>,
    pre: Vec<f64>,
    /// Inverted-dropout scale per unit (0 or 1/keep); `None` without dropout
    mask: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
struct Gradients {
    weights: Vec<Vec<f64>>,
    biases: Vec<Vec<f64>>,
}

/// Loss and accuracy of one pass over a sample set
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EpochMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct Network {
    layers: Vec<Dense>,
    learning_rate: f64,
    step: u64,
}

impl Network {
    /// `hidden` lists the width of each ReLU layer; a single sigmoid unit follows.
    pub fn new(
        inputs: usize,
        hidden: &[usize],
        dropout: f64,
        learning_rate: f64,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut width = inputs;
        for &units in hidden {
            layers.push(Dense::new(width, units, Activation::Relu, dropout, rng));
            width = units;
        }
        layers.push(Dense::new(width, 1, Activation::Sigmoid, 0.0, rng));

        Self {
            layers,
            learning_rate,
            step: 0,
        }
    }

    pub fn input_width(&self) -> usize {
        self.layers[0].inputs
    }

    /// Inference pass (dropout disabled)
    pub fn predict(&self, input: &[f64]) -> f64 {
        let mut activations = input.to_vec();
        for layer in &self.layers {
            activations = layer
                .pre_activation(&activations)
                .into_iter()
                .map(|z| layer.activation.apply(z))
                .collect();
        }
        activations[0]
    }

    pub fn evaluate(&self, samples: &[(&[f64], f64)]) -> EpochMetrics {
        if samples.is_empty() {
            return EpochMetrics {
                loss: 0.0,
                accuracy: 0.0,
            };
        }

        let mut loss = 0.0;
        let mut correct = 0usize;
        for (input, label) in samples {
            let output = self.predict(input);
            loss += binary_cross_entropy(output, *label);
            if (output > 0.5) == (*label > 0.5) {
                correct += 1;
            }
        }

        EpochMetrics {
            loss: loss / samples.len() as f64,
            accuracy: correct as f64 / samples.len() as f64,
        }
    }

    /// One epoch of shuffled mini-batch training. Returns the mean training
    /// loss and accuracy observed during the epoch (with dropout active).
    pub fn train_epoch(
        &mut self,
        samples: &[(&[f64], f64)],
        batch_size: usize,
        rng: &mut ChaCha8Rng,
    ) -> EpochMetrics {
        let mut order: Vec<usize> = (0..samples.len()).collect();
        order.shuffle(rng);

        let mut total_loss = 0.0;
        let mut correct = 0usize;

        for batch in order.chunks(batch_size.max(1)) {
            let mut grads = self.zero_gradients();

            for &idx in batch {
                let (input, label) = samples[idx];
                let (traces, output) = self.forward_train(input, rng);

                total_loss += binary_cross_entropy(output, label);
                if (output > 0.5) == (label > 0.5) {
                    correct += 1;
                }

                self.backward(&traces, output, label, &mut grads);
            }

            self.apply_adam(&grads, batch.len());
        }

        EpochMetrics {
            loss: total_loss / samples.len().max(1) as f64,
            accuracy: correct as f64 / samples.len().max(1) as f64,
        }
    }

    fn forward_train(&self, input: &[f64], rng: &mut ChaCha8Rng) -> (Vec<LayerTrace>, f64) {
        let mut traces = Vec::with_capacity(self.layers.len());
        let mut activations = input.to_vec();

        for layer in &self.layers {
            let pre = layer.pre_activation(&activations);
            let mask = if layer.dropout > 0.0 {
                let keep = 1.0 - layer.dropout;
                Some(
                    (0..layer.outputs)
                        .map(|_| if rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 })
                        .collect::<Vec<f64>>(),
                )
            } else {
                None
            };

            let mut output: Vec<f64> = pre.iter().map(|&z| layer.activation.apply(z)).collect();
            if let Some(mask) = &mask {
                output.iter_mut().zip(mask).for_each(|(a, m)| *a *= m);
            }

            traces.push(LayerTrace {
                input: activations,
                pre,
                mask,
            });
            activations = output;
        }

        (traces, activations[0])
    }

    fn backward(&self, traces: &[LayerTrace], output: f64, label: f64, grads: &mut Gradients) {
        // sigmoid + cross-entropy collapses to (y - t)
        let mut delta = vec![output - label];

        for (l, layer) in self.layers.iter().enumerate().rev() {
            let trace = &traces[l];

            if layer.activation == Activation::Relu {
                for (o, d) in delta.iter_mut().enumerate() {
                    let scale = trace.mask.as_ref().map_or(1.0, |mask| mask[o]);
                    let slope = if trace.pre[o] > 0.0 { 1.0 } else { 0.0 };
                    *d *= scale * slope;
                }
            }

            let mut upstream = vec![0.0; layer.inputs];
            for (o, &d) in delta.iter().enumerate() {
                if d == 0.0 {
                    continue;
                }
                grads.biases[l][o] += d;
                let row = o * layer.inputs;
                for i in 0..layer.inputs {
                    grads.weights[l][row + i] += d * trace.input[i];
                    upstream[i] += layer.weights[row + i] * d;
                }
            }

            delta = upstream;
        }
    }

    fn zero_gradients(&self) -> Gradients {
        Gradients {
            weights: self.layers.iter().map(|l| vec![0.0; l.weights.len()]).collect(),
            biases: self.layers.iter().map(|l| vec![0.0; l.biases.len()]).collect(),
        }
    }

    fn apply_adam(&mut self, grads: &Gradients, batch_len: usize) {
        self.step += 1;
        let t = self.step as i32;
        let scale = 1.0 / batch_len.max(1) as f64;
        let lr = self.learning_rate * (1.0 - ADAM_BETA2.powi(t)).sqrt() / (1.0 - ADAM_BETA1.powi(t));

        for (l, layer) in self.layers.iter_mut().enumerate() {
            adam_update(
                &mut layer.weights,
                &mut layer.adam.m_weights,
                &mut layer.adam.v_weights,
                &grads.weights[l],
                scale,
                lr,
            );
            adam_update(
                &mut layer.biases,
                &mut layer.adam.m_biases,
                &mut layer.adam.v_biases,
                &grads.biases[l],
                scale,
                lr,
            );
        }
    }
}

fn adam_update(params: &mut [f64], m: &mut [f64], v: &mut [f64], grads: &[f64], scale: f64, lr: f64) {
    for i in 0..params.len() {
        let g = grads[i] * scale;
        m[i] = ADAM_BETA1 * m[i] + (1.0 - ADAM_BETA1) * g;
        v[i] = ADAM_BETA2 * v[i] + (1.0 - ADAM_BETA2) * g * g;
        params[i] -= lr * m[i] / (v[i].sqrt() + ADAM_EPSILON);
    }
}

pub(crate) fn binary_cross_entropy(output: f64, label: f64) -> f64 {
    let p = output.clamp(LOG_EPSILON, 1.0 - LOG_EPSILON);
    -(label * p.ln() + (1.0 - label) * (1.0 - p).ln())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn test_output_is_probability() {
        let net = Network::new(5, &[32, 16], 0.2, 0.001, &mut rng());
        for input in [[0.0; 5], [1.0; 5], [10.0, -10.0, 3.0, 0.5, -2.0]] {
            let p = net.predict(&input);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let net = Network::new(5, &[32, 16], 0.2, 0.001, &mut rng());
        let input = [0.3, 0.1, 0.5, 0.5, 0.6];
        assert_eq!(net.predict(&input), net.predict(&input));
    }

    #[test]
    fn test_cross_entropy() {
        assert!(binary_cross_entropy(0.99, 1.0) < 0.02);
        assert!(binary_cross_entropy(0.01, 1.0) > 4.0);
        // clipped, never infinite
        assert!(binary_cross_entropy(0.0, 1.0).is_finite());
    }

    #[test]
    fn test_learns_separable_rule() {
        // label is 1 when the first feature is above 0.5
        let inputs: Vec<[f64; 2]> = (0..200)
            .map(|i| {
                let x = (i as f64 * 0.37) % 1.0;
                [x, 0.5]
            })
            .collect();
        let samples: Vec<(&[f64], f64)> = inputs
            .iter()
            .map(|x| (x.as_slice(), if x[0] > 0.5 { 1.0 } else { 0.0 }))
            .collect();

        let mut rng = rng();
        let mut net = Network::new(2, &[16], 0.0, 0.05, &mut rng);
        let before = net.evaluate(&samples);
        for _ in 0..200 {
            net.train_epoch(&samples, 16, &mut rng);
        }
        let after = net.evaluate(&samples);

        assert!(after.loss < before.loss);
        assert!(after.accuracy > 0.9, "accuracy {}", after.accuracy);
    }
}
