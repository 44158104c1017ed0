//! Building blocks of the intent network.
//!
//! Layers take an optional random generator: `Some` runs them in training
//! mode (dropout active, batch statistics), `None` in inference mode.
//! Dropout masks are drawn from that generator so a seeded run is
//! reproducible.

use candle_core::{DType, Device, Shape, Tensor, Var};
use candle_nn::{Init, Linear, Module, VarBuilder};
use rand::Rng;
use rand::rngs::StdRng;

use crate::error::Result;

/// Inverted dropout mask: each element is 0 with probability `rate`, else `1 / (1 - rate)`.
pub fn dropout_mask<S: Into<Shape>>(
    shape: S,
    rate: f32,
    rng: &mut StdRng,
    device: &Device,
) -> Result<Tensor> {
    let shape = shape.into();
    let keep = 1.0 - rate;
    let scale = 1.0 / keep;
    let values: Vec<f32> = (0..shape.elem_count())
        .map(|_| if rng.random::<f32>() < keep { scale } else { 0.0 })
        .collect();
    Ok(Tensor::from_vec(values, shape, device)?)
}

fn sigmoid(xs: &Tensor) -> candle_core::Result<Tensor> {
    xs.neg()?.exp()?.affine(1.0, 1.0)?.recip()
}

/// Blend a new state into the old one: `mask * new + (1 - mask) * old`.
fn masked_update(new: &Tensor, old: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let keep = mask.affine(-1.0, 1.0)?;
    new.broadcast_mul(mask)? + old.broadcast_mul(&keep)?
}

/// One direction of an LSTM layer. Gate order is input, forget, cell, output.
#[derive(Debug)]
pub struct LstmCell {
    ih: Linear,
    hh: Linear,
    hidden: usize,
}

impl LstmCell {
    pub fn new(input: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        let ih = candle_nn::linear(input, 4 * hidden, vb.pp("ih"))?;
        let hh = candle_nn::linear_no_bias(hidden, 4 * hidden, vb.pp("hh"))?;
        Ok(Self { ih, hh, hidden })
    }

    /// Run over `(batch, steps, input)` and return the state after every step
    /// (in time order) plus the final state.
    ///
    /// Steps where `mask` (`(batch, steps)`, 1.0 for real tokens) is 0 leave
    /// the state unchanged.
    pub fn scan(
        &self,
        xs: &Tensor,
        mask: &Tensor,
        reverse: bool,
        recurrent_mask: Option<&Tensor>,
    ) -> Result<(Vec<Tensor>, Tensor)> {
        let (batch, steps, _) = xs.dims3()?;
        let projected = self.ih.forward(xs)?;

        let mut h = Tensor::zeros((batch, self.hidden), DType::F32, xs.device())?;
        let mut c = h.clone();
        let mut outputs = Vec::with_capacity(steps);

        let order: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((0..steps).rev())
        } else {
            Box::new(0..steps)
        };

        for step in order {
            let x_t = projected.narrow(1, step, 1)?.squeeze(1)?;
            let m_t = mask.narrow(1, step, 1)?;

            let h_in = match recurrent_mask {
                Some(m) => h.mul(m)?,
                None => h.clone(),
            };
            let gates = (x_t + self.hh.forward(&h_in)?)?;
            let gates = gates.chunk(4, 1)?;

            let i = sigmoid(&gates[0])?;
            let f = sigmoid(&gates[1])?;
            let g = gates[2].tanh()?;
            let o = sigmoid(&gates[3])?;

            let c_new = ((f * &c)? + (i * g)?)?;
            let h_new = (o * c_new.tanh()?)?;

            c = masked_update(&c_new, &c, &m_t)?;
            h = masked_update(&h_new, &h, &m_t)?;
            outputs.push(h.clone());
        }

        if reverse {
            outputs.reverse();
        }
        Ok((outputs, h))
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }
}

/// Bidirectional LSTM layer with input and recurrent dropout.
///
/// Dropout masks are drawn once per batch and shared by all time steps.
#[derive(Debug)]
pub struct BiLstm {
    forward: LstmCell,
    backward: LstmCell,
    input: usize,
    dropout: f32,
    recurrent_dropout: f32,
}

impl BiLstm {
    pub fn new(
        input: usize,
        hidden: usize,
        dropout: f32,
        recurrent_dropout: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            forward: LstmCell::new(input, hidden, vb.pp("forward"))?,
            backward: LstmCell::new(input, hidden, vb.pp("backward"))?,
            input,
            dropout,
            recurrent_dropout,
        })
    }

    /// Width of the concatenated output.
    pub fn output_dim(&self) -> usize {
        self.forward.hidden() + self.backward.hidden()
    }

    fn run(
        &self,
        xs: &Tensor,
        mask: &Tensor,
        rng: Option<&mut StdRng>,
    ) -> Result<((Vec<Tensor>, Tensor), (Vec<Tensor>, Tensor))> {
        let batch = xs.dim(0)?;
        let device = xs.device();

        let mut xs_forward = xs.clone();
        let mut xs_backward = xs.clone();
        let mut recurrent_forward = None;
        let mut recurrent_backward = None;

        if let Some(rng) = rng {
            if self.dropout > 0.0 {
                let m = dropout_mask((batch, 1, self.input), self.dropout, rng, device)?;
                xs_forward = xs.broadcast_mul(&m)?;
                let m = dropout_mask((batch, 1, self.input), self.dropout, rng, device)?;
                xs_backward = xs.broadcast_mul(&m)?;
            }
            if self.recurrent_dropout > 0.0 {
                let rate = self.recurrent_dropout;
                recurrent_forward =
                    Some(dropout_mask((batch, self.forward.hidden()), rate, rng, device)?);
                recurrent_backward =
                    Some(dropout_mask((batch, self.backward.hidden()), rate, rng, device)?);
            }
        }

        let forward = self
            .forward
            .scan(&xs_forward, mask, false, recurrent_forward.as_ref())?;
        let backward = self
            .backward
            .scan(&xs_backward, mask, true, recurrent_backward.as_ref())?;
        Ok((forward, backward))
    }

    /// `(batch, steps, input)` to `(batch, steps, 2 * hidden)`.
    pub fn forward_sequence(
        &self,
        xs: &Tensor,
        mask: &Tensor,
        rng: Option<&mut StdRng>,
    ) -> Result<Tensor> {
        let ((forward, _), (backward, _)) = self.run(xs, mask, rng)?;
        let forward = Tensor::stack(&forward, 1)?;
        let backward = Tensor::stack(&backward, 1)?;
        Ok(Tensor::cat(&[forward, backward], 2)?)
    }

    /// `(batch, steps, input)` to the final states of both directions, `(batch, 2 * hidden)`.
    pub fn forward_final(
        &self,
        xs: &Tensor,
        mask: &Tensor,
        rng: Option<&mut StdRng>,
    ) -> Result<Tensor> {
        let ((_, forward), (_, backward)) = self.run(xs, mask, rng)?;
        Ok(Tensor::cat(&[forward, backward], 1)?)
    }
}

/// Batch normalization over the feature axis of `(batch, features)` inputs.
///
/// Running statistics live in the same variable map as the trainable
/// parameters so they are persisted with them; they are updated in place
/// during training and are not handed to the optimizer.
#[derive(Debug)]
pub struct BatchNorm {
    gamma: Tensor,
    beta: Tensor,
    running_mean: Var,
    running_var: Var,
    momentum: f64,
    eps: f64,
}

/// Variable names of running statistics.
pub const RUNNING_STAT_NAMES: [&str; 2] = ["running_mean", "running_var"];

impl BatchNorm {
    pub fn new(features: usize, momentum: f64, eps: f64, vb: VarBuilder) -> Result<Self> {
        let gamma = vb.get_with_hints(features, "gamma", Init::Const(1.0))?;
        let beta = vb.get_with_hints(features, "beta", Init::Const(0.0))?;
        let running_mean =
            Var::from_tensor(&vb.get_with_hints(features, "running_mean", Init::Const(0.0))?)?;
        let running_var =
            Var::from_tensor(&vb.get_with_hints(features, "running_var", Init::Const(1.0))?)?;

        Ok(Self {
            gamma,
            beta,
            running_mean,
            running_var,
            momentum,
            eps,
        })
    }

    pub fn forward(&self, xs: &Tensor, training: bool) -> Result<Tensor> {
        let normalized = if training {
            let mean = xs.mean(0)?;
            let centered = xs.broadcast_sub(&mean)?;
            let var = centered.sqr()?.mean(0)?;
            let normalized = centered.broadcast_div(&var.affine(1.0, self.eps)?.sqrt()?)?;

            let m = self.momentum;
            let running_mean = (self.running_mean.as_tensor().affine(m, 0.0)?
                + mean.affine(1.0 - m, 0.0)?)?;
            let running_var =
                (self.running_var.as_tensor().affine(m, 0.0)? + var.affine(1.0 - m, 0.0)?)?;
            self.running_mean.set(&running_mean)?;
            self.running_var.set(&running_var)?;

            normalized
        } else {
            let std = self.running_var.as_tensor().affine(1.0, self.eps)?.sqrt()?;
            xs.broadcast_sub(self.running_mean.as_tensor())?
                .broadcast_div(&std)?
        };

        Ok(normalized
            .broadcast_mul(&self.gamma)?
            .broadcast_add(&self.beta)?)
    }
}

/// Linear layer, batch normalization, ReLU and dropout.
#[derive(Debug)]
pub struct DenseBlock {
    linear: Linear,
    norm: BatchNorm,
    dropout: f32,
}

impl DenseBlock {
    pub fn new(
        input: usize,
        output: usize,
        dropout: f32,
        momentum: f64,
        eps: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            linear: candle_nn::linear(input, output, vb.pp("linear"))?,
            norm: BatchNorm::new(output, momentum, eps, vb.pp("norm"))?,
            dropout,
        })
    }

    pub fn forward(&self, xs: &Tensor, rng: Option<&mut StdRng>) -> Result<Tensor> {
        let hidden = self.linear.forward(xs)?;
        let hidden = self.norm.forward(&hidden, rng.is_some())?.relu()?;

        match rng {
            Some(rng) if self.dropout > 0.0 => {
                let mask = dropout_mask(hidden.shape().clone(), self.dropout, rng, hidden.device())?;
                Ok(hidden.mul(&mask)?)
            }
            _ => Ok(hidden),
        }
    }
}
