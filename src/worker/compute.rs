//! Computation units run inside the worker process.

use crate::payload::{Array, Element, Layout};
use std::ops::Add;

/// A transform invoked once per tick on the latest input.
///
/// The unit is built in the controller and moved into the worker process
/// when it is forked; after that only the worker calls it. It may keep state
/// between calls. An `Err` (or a panic) ends the worker process.
pub trait Computation<I: Element, O: Element> {
    fn update(&mut self, input: &Array<I>) -> anyhow::Result<Array<O>>;
}

impl<I, O, F> Computation<I, O> for F
where
    I: Element,
    O: Element,
    F: FnMut(&Array<I>) -> anyhow::Result<Array<O>>,
{
    fn update(&mut self, input: &Array<I>) -> anyhow::Result<Array<O>> {
        self(input)
    }
}

/// Multiplies every element by two.
#[derive(Debug, Clone)]
pub struct Doubler {
    input_layout: Layout,
}

impl Doubler {
    pub fn new<T: Element>(input_example: &Array<T>) -> Self {
        Self {
            input_layout: input_example.layout(),
        }
    }

    pub fn input_layout(&self) -> &Layout {
        &self.input_layout
    }
}

impl<T> Computation<T, T> for Doubler
where
    T: Element + Add<Output = T>,
{
    fn update(&mut self, input: &Array<T>) -> anyhow::Result<Array<T>> {
        Ok(input.map(|x| x + x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubler_int() {
        let input = Array::<i32>::from_vec([1, 3], vec![10, 20, 30]).unwrap();
        let mut unit = Doubler::new(&input);
        let output = unit.update(&input).unwrap();
        assert_eq!(output.as_slice(), &[20, 40, 60]);
        assert_eq!(output.shape(), &[1, 3]);
        assert_eq!(unit.input_layout(), &input.layout());
    }

    #[test]
    fn test_doubler_float() {
        let input = Array::<f32>::from_vec([2], vec![0.25, -1.5]).unwrap();
        let output = Doubler::new(&input).update(&input).unwrap();
        assert_eq!(output.as_slice(), &[0.5, -3.0]);
    }

    #[test]
    fn test_closure_is_a_computation() {
        let mut calls = 0;
        let mut unit = |input: &Array<u8>| -> anyhow::Result<Array<u16>> {
            calls += 1;
            Ok(input.map(u16::from))
        };
        let input = Array::<u8>::from_vec([2], vec![1, 255]).unwrap();
        let output = Computation::update(&mut unit, &input).unwrap();
        assert_eq!(output.as_slice(), &[1u16, 255]);
        assert_eq!(calls, 1);
    }
}
