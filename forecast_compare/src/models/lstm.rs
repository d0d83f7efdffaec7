//! Stacked LSTM regression network
//!
//! A sequence of scalar inputs runs through one or more LSTM layers, the last
//! hidden state goes through a linear dense layer and a single linear output
//! unit. Inverted dropout follows every LSTM layer while training. Gradients
//! are computed by back-propagation through time and applied with Adam.
//!
//! Gate pre-activations are packed as `[i | f | g | o]` in
//! `z = x·Wx + h·Wh + b`.

use nalgebra::DMatrix;
use ndarray::{s, Array2, ArrayView2, Axis, Zip};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal, Uniform};

/// Layer sizes and regularisation of a [`Network`]
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkShape {
    /// Width of each stacked LSTM layer, input side first
    pub lstm_units: Vec<usize>,
    /// Width of the dense layer before the output unit
    pub dense_units: usize,
    /// Fraction of activations dropped after each LSTM layer
    pub dropout: f64,
}

fn sigmoid(z: ArrayView2<f64>) -> Array2<f64> {
    z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

fn glorot(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    Array2::from_shape_fn((rows, cols), |_| dist.sample(rng))
}

/// Random matrix with orthonormal rows when `rows <= cols`, orthonormal
/// columns otherwise.
///
/// Q of the QR decomposition of a standard normal sample, with column signs
/// taken from the diagonal of R so the result is uniformly distributed.
fn orthogonal(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f64> {
    let (tall, short) = (rows.max(cols), rows.min(cols));
    let sample = DMatrix::<f64>::from_fn(tall, short, |_, _| rng.sample(StandardNormal));
    let qr = sample.qr();
    let r = qr.r();
    let mut q = qr.q();

    for j in 0..short {
        if r[(j, j)] < 0.0 {
            for v in q.column_mut(j).iter_mut() {
                *v = -*v;
            }
        }
    }

    Array2::from_shape_fn((rows, cols), |(i, j)| {
        if rows <= cols {
            q[(j, i)]
        } else {
            q[(i, j)]
        }
    })
}

/// Intermediate values of one LSTM time step
#[derive(Debug, Clone)]
struct StepCache {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
}

/// One LSTM layer over a batch of sequences
#[derive(Debug, Clone)]
struct LstmLayer {
    units: usize,
    wx: Array2<f64>,
    wh: Array2<f64>,
    b: Array2<f64>,
}

impl LstmLayer {
    fn new(input: usize, units: usize, rng: &mut StdRng) -> Self {
        let mut b: Array2<f64> = Array2::zeros((1, 4 * units));
        b.slice_mut(s![.., units..2 * units]).fill(1.0);

        Self {
            units,
            wx: glorot(input, 4 * units, rng),
            wh: orthogonal(units, 4 * units, rng),
            b,
        }
    }

    /// Run the layer over `xs`, one `(batch, input)` matrix per time step
    fn forward(&self, xs: &[Array2<f64>]) -> (Vec<Array2<f64>>, Vec<StepCache>) {
        let batch = xs.first().map_or(0, |x| x.nrows());
        let u = self.units;
        let mut h: Array2<f64> = Array2::zeros((batch, u));
        let mut c: Array2<f64> = Array2::zeros((batch, u));
        let mut outputs = Vec::with_capacity(xs.len());
        let mut caches = Vec::with_capacity(xs.len());

        for x in xs {
            let z = x.dot(&self.wx) + h.dot(&self.wh) + &self.b;
            let i = sigmoid(z.slice(s![.., 0..u]));
            let f = sigmoid(z.slice(s![.., u..2 * u]));
            let g = z.slice(s![.., 2 * u..3 * u]).mapv(f64::tanh);
            let o = sigmoid(z.slice(s![.., 3 * u..4 * u]));

            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            caches.push(StepCache {
                x: x.clone(),
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            outputs.push(h_next.clone());
            h = h_next;
            c = c_next;
        }

        (outputs, caches)
    }

    /// Back-propagate `d_outputs` (one per time step); returns the parameter
    /// gradients `[wx, wh, b]` and the gradient for each input step
    fn backward(
        &self,
        caches: &[StepCache],
        d_outputs: &[Array2<f64>],
    ) -> ([Array2<f64>; 3], Vec<Array2<f64>>) {
        let u = self.units;
        let batch = caches.first().map_or(0, |step| step.x.nrows());
        let mut d_wx: Array2<f64> = Array2::zeros(self.wx.raw_dim());
        let mut d_wh: Array2<f64> = Array2::zeros(self.wh.raw_dim());
        let mut d_b: Array2<f64> = Array2::zeros(self.b.raw_dim());
        let mut d_inputs: Vec<Array2<f64>> = vec![Array2::zeros((0, 0)); caches.len()];
        let mut dh_next: Array2<f64> = Array2::zeros((batch, u));
        let mut dc_next: Array2<f64> = Array2::zeros((batch, u));

        for t in (0..caches.len()).rev() {
            let step = &caches[t];
            let dh = &d_outputs[t] + &dh_next;

            let d_o = &dh * &step.tanh_c;
            let dc = &dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            let mut dz: Array2<f64> = Array2::zeros((batch, 4 * u));
            dz.slice_mut(s![.., 0..u])
                .assign(&(&d_i * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., u..2 * u])
                .assign(&(&d_f * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * u..3 * u])
                .assign(&(&d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * u..4 * u])
                .assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            d_wx += &step.x.t().dot(&dz);
            d_wh += &step.h_prev.t().dot(&dz);
            d_b += &dz.sum_axis(Axis(0)).insert_axis(Axis(0));
            d_inputs[t] = dz.dot(&self.wx.t());
            dh_next = dz.dot(&self.wh.t());
        }

        ([d_wx, d_wh, d_b], d_inputs)
    }
}

/// Fully connected layer with a linear activation
#[derive(Debug, Clone)]
struct DenseLayer {
    w: Array2<f64>,
    b: Array2<f64>,
}

impl DenseLayer {
    fn new(input: usize, units: usize, rng: &mut StdRng) -> Self {
        Self {
            w: glorot(input, units, rng),
            b: Array2::zeros((1, units)),
        }
    }

    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.w) + &self.b
    }

    /// Returns `[dw, db]` and the input gradient
    fn backward(&self, x: &Array2<f64>, dy: &Array2<f64>) -> ([Array2<f64>; 2], Array2<f64>) {
        let dw = x.t().dot(dy);
        let db = dy.sum_axis(Axis(0)).insert_axis(Axis(0));
        ([dw, db], dy.dot(&self.w.t()))
    }
}

/// Values kept from a training forward pass
struct ForwardCache {
    layer_caches: Vec<Vec<StepCache>>,
    /// Dropout masks per LSTM layer; all steps for inner layers, last step
    /// only for the final layer
    masks: Vec<Vec<Option<Array2<f64>>>>,
    dense_input: Array2<f64>,
    output_input: Array2<f64>,
}

/// Stacked LSTM with a dense head and one linear output
#[derive(Debug, Clone)]
pub struct Network {
    shape: NetworkShape,
    layers: Vec<LstmLayer>,
    hidden: DenseLayer,
    output: DenseLayer,
}

impl Network {
    /// Initialise a network for scalar sequences
    pub fn new(shape: NetworkShape, rng: &mut StdRng) -> Self {
        let mut layers = Vec::with_capacity(shape.lstm_units.len());
        let mut input = 1;
        for &units in &shape.lstm_units {
            layers.push(LstmLayer::new(input, units, rng));
            input = units;
        }
        let hidden = DenseLayer::new(input, shape.dense_units, rng);
        let output = DenseLayer::new(shape.dense_units, 1, rng);

        Self {
            shape,
            layers,
            hidden,
            output,
        }
    }

    /// Layer sizes of this network
    pub fn shape(&self) -> &NetworkShape {
        &self.shape
    }

    /// All trainable matrices, in the order gradients are returned
    pub fn params_mut(&mut self) -> Vec<&mut Array2<f64>> {
        let mut params = Vec::with_capacity(3 * self.layers.len() + 4);
        for layer in &mut self.layers {
            params.push(&mut layer.wx);
            params.push(&mut layer.wh);
            params.push(&mut layer.b);
        }
        params.push(&mut self.hidden.w);
        params.push(&mut self.hidden.b);
        params.push(&mut self.output.w);
        params.push(&mut self.output.b);
        params
    }

    /// Predict one value per sequence of the batch, without dropout
    pub fn predict(&self, xs: &[Array2<f64>]) -> Vec<f64> {
        let (y_hat, _) = self.forward(xs, None);
        y_hat.column(0).to_vec()
    }

    /// Mean squared error of the batch and its gradient for every parameter.
    ///
    /// Dropout is applied when an RNG is supplied.
    pub fn loss_and_gradients(
        &self,
        xs: &[Array2<f64>],
        targets: &[f64],
        rng: Option<&mut StdRng>,
    ) -> (f64, Vec<Array2<f64>>) {
        let (y_hat, cache) = self.forward(xs, rng);
        let batch = targets.len() as f64;

        let mut d_y: Array2<f64> = Array2::zeros((targets.len(), 1));
        let mut loss = 0.0;
        for (row, &target) in targets.iter().enumerate() {
            let err = y_hat[(row, 0)] - target;
            loss += err * err;
            d_y[(row, 0)] = 2.0 * err / batch;
        }
        loss /= batch;

        (loss, self.backward(&cache, &d_y))
    }

    fn dropout_mask(&self, rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f64> {
        let keep = 1.0 - self.shape.dropout;
        Array2::from_shape_fn((rows, cols), |_| {
            if rng.gen::<f64>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        })
    }

    fn forward(
        &self,
        xs: &[Array2<f64>],
        mut rng: Option<&mut StdRng>,
    ) -> (Array2<f64>, ForwardCache) {
        let dropout_active = self.shape.dropout > 0.0;
        let last_layer = self.layers.len().saturating_sub(1);
        let mut inputs = xs.to_vec();
        let mut layer_caches = Vec::with_capacity(self.layers.len());
        let mut masks = Vec::with_capacity(self.layers.len());

        for (l, layer) in self.layers.iter().enumerate() {
            let (mut outputs, caches) = layer.forward(&inputs);
            layer_caches.push(caches);

            let mut layer_masks = vec![None; outputs.len()];
            if let (Some(rng), true) = (rng.as_deref_mut(), dropout_active) {
                // the final layer only hands its last step to the dense head
                let first = if l == last_layer {
                    outputs.len().saturating_sub(1)
                } else {
                    0
                };
                for t in first..outputs.len() {
                    let mask = self.dropout_mask(outputs[t].nrows(), layer.units, rng);
                    let dropped = &outputs[t] * &mask;
                    outputs[t] = dropped;
                    layer_masks[t] = Some(mask);
                }
            }
            masks.push(layer_masks);
            inputs = outputs;
        }

        let dense_input = inputs
            .pop()
            .unwrap_or_else(|| Array2::zeros((0, self.hidden.w.nrows())));
        let output_input = self.hidden.forward(&dense_input);
        let y_hat = self.output.forward(&output_input);

        (
            y_hat,
            ForwardCache {
                layer_caches,
                masks,
                dense_input,
                output_input,
            },
        )
    }

    fn backward(&self, cache: &ForwardCache, d_y: &Array2<f64>) -> Vec<Array2<f64>> {
        let ([d_w2, d_b2], d_hidden_out) = self.output.backward(&cache.output_input, d_y);
        let ([d_w1, d_b1], d_last) = self.hidden.backward(&cache.dense_input, &d_hidden_out);

        let mut layer_grads: Vec<[Array2<f64>; 3]> = Vec::with_capacity(self.layers.len());
        let mut d_outputs: Vec<Array2<f64>> = Vec::new();

        for (l, layer) in self.layers.iter().enumerate().rev() {
            let caches = &cache.layer_caches[l];
            let steps = caches.len();
            let batch = d_last.nrows();

            if l == self.layers.len() - 1 {
                d_outputs = vec![Array2::zeros((batch, layer.units)); steps];
                if let Some(last) = d_outputs.last_mut() {
                    *last = d_last.clone();
                }
            }
            for (d_out, mask) in d_outputs.iter_mut().zip(&cache.masks[l]) {
                if let Some(mask) = mask {
                    let masked = &*d_out * mask;
                    *d_out = masked;
                }
            }

            let (grads, d_inputs) = layer.backward(caches, &d_outputs);
            layer_grads.push(grads);
            d_outputs = d_inputs;
        }

        let mut grads = Vec::with_capacity(3 * self.layers.len() + 4);
        for layer in layer_grads.into_iter().rev() {
            grads.extend(layer);
        }
        grads.extend([d_w1, d_b1, d_w2, d_b2]);
        grads
    }
}

/// Adam optimiser state for one network
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    m: Vec<Array2<f64>>,
    v: Vec<Array2<f64>>,
}

impl Adam {
    /// Create optimiser state sized for `network`
    pub fn new(network: &mut Network, learning_rate: f64) -> Self {
        let zeros: Vec<Array2<f64>> = network
            .params_mut()
            .into_iter()
            .map(|p| Array2::zeros(p.raw_dim()))
            .collect();

        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    /// Apply one update; `grads` must match `network.params_mut()` order
    pub fn update(&mut self, network: &mut Network, grads: &[Array2<f64>]) {
        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step);
        let bias2 = 1.0 - self.beta2.powi(self.step);
        let (lr, b1, b2, eps) = (self.learning_rate, self.beta1, self.beta2, self.epsilon);

        for (((param, m), v), grad) in network
            .params_mut()
            .into_iter()
            .zip(&mut self.m)
            .zip(&mut self.v)
            .zip(grads)
        {
            Zip::from(param)
                .and(m)
                .and(v)
                .and(grad)
                .for_each(|p, m, v, &g| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }
}

/// Lay out windows as one `(batch, 1)` matrix per time step
pub fn batch_inputs<W: AsRef<[f64]>>(windows: &[W]) -> Vec<Array2<f64>> {
    let steps = windows.first().map_or(0, |w| w.as_ref().len());
    (0..steps)
        .map(|t| {
            Array2::from_shape_fn((windows.len(), 1), |(row, _)| windows[row].as_ref()[t])
        })
        .collect()
}
