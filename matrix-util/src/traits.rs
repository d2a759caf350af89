use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Convert to and from the vector of triplets
pub trait MatTriplets {
    type Mat;
    type Scalar;

    fn from_nonzero_triplets<I>(
        nrow: usize,
        ncol: usize,
        triplets: Vec<(I, I, Self::Scalar)>,
    ) -> anyhow::Result<Self::Mat>
    where
        I: TryInto<usize> + Copy,
        <I as TryInto<usize>>::Error: std::fmt::Debug;

    fn to_nonzero_triplets(
        &self,
    ) -> anyhow::Result<(usize, usize, Vec<(usize, usize, Self::Scalar)>)>;
}

impl MatTriplets for CsrMatrix<f32> {
    type Mat = Self;
    type Scalar = f32;

    /// Duplicated `(row, col)` entries are summed up
    fn from_nonzero_triplets<I>(
        nrow: usize,
        ncol: usize,
        triplets: Vec<(I, I, Self::Scalar)>,
    ) -> anyhow::Result<Self::Mat>
    where
        I: TryInto<usize> + Copy,
        <I as TryInto<usize>>::Error: std::fmt::Debug,
    {
        let mut coo = CooMatrix::<f32>::new(nrow, ncol);
        for (ii, jj, x_ij) in triplets {
            let ii: usize = ii
                .try_into()
                .map_err(|e| anyhow::anyhow!("invalid row index: {:?}", e))?;
            let jj: usize = jj
                .try_into()
                .map_err(|e| anyhow::anyhow!("invalid column index: {:?}", e))?;
            if ii >= nrow || jj >= ncol {
                anyhow::bail!("({}, {}) out of bound ({} x {})", ii, jj, nrow, ncol);
            }
            if x_ij != 0.0 {
                coo.push(ii, jj, x_ij);
            }
        }
        Ok(CsrMatrix::from(&coo))
    }

    /// Explicitly stored zeros are skipped
    fn to_nonzero_triplets(
        &self,
    ) -> anyhow::Result<(usize, usize, Vec<(usize, usize, Self::Scalar)>)> {
        let triplets = self
            .triplet_iter()
            .filter(|&(_, _, &x)| x != 0.0)
            .map(|(i, j, &x)| (i, j, x))
            .collect();
        Ok((self.nrows(), self.ncols(), triplets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csr_triplets_sum_duplicates_and_drop_zeros() -> anyhow::Result<()> {
        let triplets: Vec<(u64, u64, f32)> =
            vec![(0, 1, 2.0), (0, 1, 3.0), (2, 0, 1.0), (1, 1, 0.0)];
        let csr = CsrMatrix::<f32>::from_nonzero_triplets(3, 2, triplets)?;

        let (nrow, ncol, out) = csr.to_nonzero_triplets()?;
        assert_eq!((nrow, ncol), (3, 2));
        assert_eq!(out, vec![(0, 1, 5.0), (2, 0, 1.0)]);
        Ok(())
    }

    #[test]
    fn out_of_bound_triplets_are_rejected() {
        let triplets: Vec<(usize, usize, f32)> = vec![(3, 0, 1.0)];
        assert!(CsrMatrix::<f32>::from_nonzero_triplets(3, 2, triplets).is_err());
    }
}
