//! Concrete state mappings.
//!
//! Mappings relate an independent input state to a mapped output state.
//! The ones here are linear, so `apply` and `apply_j` coincide; what
//! matters is that `apply_jt` is the exact adjoint of `apply_j` - the
//! virtual-work round-trip tests at the bottom of this module hold that
//! line, since the type system cannot.

use nalgebra::Vector3;
use scene_graph::StatePropagator;
use scene_types::{Result, SceneError, StateId};

/// Maps every input dof straight to the same output dof.
#[derive(Debug, Clone)]
pub struct IdentityMapping {
    name: String,
    input: StateId,
    output: StateId,
}

impl IdentityMapping {
    /// Create an identity mapping.
    #[must_use]
    pub fn new(name: impl Into<String>, input: StateId, output: StateId) -> Self {
        Self {
            name: name.into(),
            input,
            output,
        }
    }
}

impl StatePropagator for IdentityMapping {
    fn name(&self) -> &str {
        &self.name
    }

    fn input(&self) -> StateId {
        self.input
    }

    fn output(&self) -> StateId {
        self.output
    }

    fn apply(&self, input: &[Vector3<f64>], output: &mut [Vector3<f64>]) -> Result<()> {
        check_len(input.len(), output.len())?;
        output.copy_from_slice(input);
        Ok(())
    }

    fn apply_j(&self, input: &[Vector3<f64>], output: &mut [Vector3<f64>]) -> Result<()> {
        self.apply(input, output)
    }

    fn apply_jt(
        &self,
        output_force: &[Vector3<f64>],
        input_force: &mut [Vector3<f64>],
    ) -> Result<()> {
        check_len(output_force.len(), input_force.len())?;
        for (inp, out) in input_force.iter_mut().zip(output_force) {
            *inp += out;
        }
        Ok(())
    }
}

/// Maps a subset of input dofs to the output dofs: `out[i] = in[index[i]]`.
///
/// This is the mapping contact mappers use to expose the contact-relevant
/// dofs of a body as an auxiliary state.
#[derive(Debug, Clone)]
pub struct SubsetMapping {
    name: String,
    input: StateId,
    output: StateId,
    indices: Vec<usize>,
}

impl SubsetMapping {
    /// Create a subset mapping selecting `indices` from the input.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        input: StateId,
        output: StateId,
        indices: Vec<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            indices,
        }
    }

    /// The selected input dof indices.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl StatePropagator for SubsetMapping {
    fn name(&self) -> &str {
        &self.name
    }

    fn input(&self) -> StateId {
        self.input
    }

    fn output(&self) -> StateId {
        self.output
    }

    fn apply(&self, input: &[Vector3<f64>], output: &mut [Vector3<f64>]) -> Result<()> {
        check_len(self.indices.len(), output.len())?;
        for (out, &index) in output.iter_mut().zip(&self.indices) {
            *out = *input.get(index).ok_or(SceneError::SizeMismatch {
                expected: input.len(),
                actual: index,
            })?;
        }
        Ok(())
    }

    fn apply_j(&self, input: &[Vector3<f64>], output: &mut [Vector3<f64>]) -> Result<()> {
        self.apply(input, output)
    }

    fn apply_jt(
        &self,
        output_force: &[Vector3<f64>],
        input_force: &mut [Vector3<f64>],
    ) -> Result<()> {
        check_len(self.indices.len(), output_force.len())?;
        for (force, &index) in output_force.iter().zip(&self.indices) {
            *input_force.get_mut(index).ok_or(SceneError::SizeMismatch {
                expected: self.indices.len(),
                actual: index,
            })? += force;
        }
        Ok(())
    }
}

/// General linear mapping: `out[i] = Σ_j w[i][j] * in[j]`, a barycentric
/// style blend of input dofs per output dof.
#[derive(Debug, Clone)]
pub struct LinearMapping {
    name: String,
    input: StateId,
    output: StateId,
    /// Per-output-dof weighted references into the input.
    rows: Vec<Vec<(usize, f64)>>,
}

impl LinearMapping {
    /// Create a linear mapping from per-output weight rows.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        input: StateId,
        output: StateId,
        rows: Vec<Vec<(usize, f64)>>,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            rows,
        }
    }
}

impl StatePropagator for LinearMapping {
    fn name(&self) -> &str {
        &self.name
    }

    fn input(&self) -> StateId {
        self.input
    }

    fn output(&self) -> StateId {
        self.output
    }

    fn apply(&self, input: &[Vector3<f64>], output: &mut [Vector3<f64>]) -> Result<()> {
        check_len(self.rows.len(), output.len())?;
        for (out, row) in output.iter_mut().zip(&self.rows) {
            let mut sum = Vector3::zeros();
            for &(index, weight) in row {
                sum += input.get(index).ok_or(SceneError::SizeMismatch {
                    expected: input.len(),
                    actual: index,
                })? * weight;
            }
            *out = sum;
        }
        Ok(())
    }

    fn apply_j(&self, input: &[Vector3<f64>], output: &mut [Vector3<f64>]) -> Result<()> {
        self.apply(input, output)
    }

    fn apply_jt(
        &self,
        output_force: &[Vector3<f64>],
        input_force: &mut [Vector3<f64>],
    ) -> Result<()> {
        check_len(self.rows.len(), output_force.len())?;
        for (force, row) in output_force.iter().zip(&self.rows) {
            for &(index, weight) in row {
                *input_force.get_mut(index).ok_or(SceneError::SizeMismatch {
                    expected: self.rows.len(),
                    actual: index,
                })? += force * weight;
            }
        }
        Ok(())
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SceneError::SizeMismatch { expected, actual })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn deterministic_vectors(n: usize, seed: f64) -> Vec<Vector3<f64>> {
        (0..n)
            .map(|i| {
                let x = (i as f64).mul_add(1.3, seed);
                Vector3::new(x.sin(), (2.0 * x).cos(), (0.5 * x).sin())
            })
            .collect()
    }

    /// Virtual-work round-trip: `(J v) · f == v · (J^T f)`.
    fn assert_adjoint(mapping: &dyn StatePropagator, in_dofs: usize, out_dofs: usize) {
        let v = deterministic_vectors(in_dofs, 0.1);
        let f = deterministic_vectors(out_dofs, 2.7);

        let mut jv = vec![Vector3::zeros(); out_dofs];
        mapping.apply_j(&v, &mut jv).unwrap();

        let mut jtf = vec![Vector3::zeros(); in_dofs];
        mapping.apply_jt(&f, &mut jtf).unwrap();

        let work_out: f64 = jv.iter().zip(&f).map(|(a, b)| a.dot(b)).sum();
        let work_in: f64 = v.iter().zip(&jtf).map(|(a, b)| a.dot(b)).sum();

        assert_relative_eq!(work_out, work_in, epsilon = 1e-12);
    }

    #[test]
    fn test_identity_adjoint_consistency() {
        let mapping = IdentityMapping::new("id", StateId::new(0), StateId::new(1));
        assert_adjoint(&mapping, 5, 5);
    }

    #[test]
    fn test_subset_adjoint_consistency() {
        let mapping = SubsetMapping::new(
            "subset",
            StateId::new(0),
            StateId::new(1),
            vec![4, 0, 2],
        );
        assert_adjoint(&mapping, 6, 3);
    }

    #[test]
    fn test_linear_adjoint_consistency() {
        let mapping = LinearMapping::new(
            "linear",
            StateId::new(0),
            StateId::new(1),
            vec![
                vec![(0, 0.25), (1, 0.75)],
                vec![(1, 0.5), (2, 0.5)],
                vec![(0, 1.0)],
                vec![(2, 0.1), (3, 0.9)],
            ],
        );
        assert_adjoint(&mapping, 4, 4);
    }

    #[test]
    fn test_subset_apply_selects() {
        let mapping =
            SubsetMapping::new("subset", StateId::new(0), StateId::new(1), vec![2, 0]);
        let input = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(3.0, 0.0, 0.0),
        ];
        let mut output = vec![Vector3::zeros(); 2];
        mapping.apply(&input, &mut output).unwrap();
        assert_relative_eq!(output[0].x, 3.0);
        assert_relative_eq!(output[1].x, 1.0);
    }

    #[test]
    fn test_apply_jt_accumulates() {
        let mapping =
            SubsetMapping::new("subset", StateId::new(0), StateId::new(1), vec![0, 0]);
        // Both output dofs reference input dof 0; forces must sum.
        let forces = vec![Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0)];
        let mut input_force = vec![Vector3::new(10.0, 0.0, 0.0)];
        mapping.apply_jt(&forces, &mut input_force).unwrap();
        assert_relative_eq!(input_force[0].x, 13.0);
    }

    #[test]
    fn test_size_mismatch_is_reported() {
        let mapping = IdentityMapping::new("id", StateId::new(0), StateId::new(1));
        let input = vec![Vector3::zeros(); 3];
        let mut output = vec![Vector3::zeros(); 2];
        assert!(matches!(
            mapping.apply(&input, &mut output),
            Err(SceneError::SizeMismatch { .. })
        ));
    }
}
