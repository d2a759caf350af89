use matrix_util::common_io::create_temp_dir_file;
use matrix_util::mtx_io::{read_mtx_triplets, MtxTripletStream};
use matrix_util::traits::MatTriplets;
use matrix_util::utils::generate_minibatch_intervals;
use nalgebra_sparse::CsrMatrix;
use rand::prelude::*;

#[test]
fn minibatch_product_mtx_test() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(7);

    let (nunit, npixel, ngene) = (23, 60, 11);

    // each pixel belongs to one unit
    let member_of: Vec<usize> = (0..npixel).map(|_| rng.random_range(0..nunit)).collect();

    let mut counts = vec![];
    for p in 0..npixel {
        for g in 0..ngene {
            if rng.random_bool(0.3) {
                counts.push((p, g, rng.random_range(1..10) as f32));
            }
        }
    }
    let dge = CsrMatrix::<f32>::from_nonzero_triplets(npixel, ngene, counts.clone())?;

    let body = create_temp_dir_file("mtx")?;
    let header = create_temp_dir_file("header")?;
    let mtx = create_temp_dir_file("mtx.gz")?;
    let body = body.to_str().unwrap();
    let header = header.to_str().unwrap();
    let mtx = mtx.to_str().unwrap();

    let mut stream = MtxTripletStream::create(body)?;

    for (lb, ub) in generate_minibatch_intervals(nunit, 5) {
        let membership: Vec<(usize, usize, f32)> = member_of
            .iter()
            .enumerate()
            .filter(|&(_, &u)| u >= lb && u < ub)
            .map(|(p, &u)| (u - lb, p, 1.))
            .collect();
        let membership = CsrMatrix::<f32>::from_nonzero_triplets(ub - lb, npixel, membership)?;
        let unit_by_gene = &membership * &dge;

        let (_, _, triplets) = unit_by_gene.to_nonzero_triplets()?;
        let triplets: Vec<(u64, u64, f32)> = triplets
            .into_iter()
            .map(|(u, g, x)| (g as u64, (lb + u) as u64, x))
            .collect();
        stream.append(&triplets)?;
    }

    let summary = stream.finalize(ngene, nunit, header, mtx)?;
    let (triplets, (nrow, ncol, total)) = read_mtx_triplets(mtx)?;

    let mut expected = vec![vec![0_f32; nunit]; ngene];
    for &(p, g, x) in counts.iter() {
        expected[g][member_of[p]] += x;
    }
    let mut observed = vec![vec![0_f32; nunit]; ngene];
    for &(g, u, x) in triplets.iter() {
        observed[g as usize][u as usize] += x;
    }

    assert_eq!(observed, expected);
    assert_eq!((nrow, ncol), (ngene, nunit));
    assert_eq!(triplets.len(), summary.nnz);

    let sum: f32 = counts.iter().map(|&(_, _, x)| x).sum();
    approx::assert_abs_diff_eq!(total, sum as f64);
    approx::assert_abs_diff_eq!(summary.total, sum as f64);

    assert!(!std::path::Path::new(body).exists());
    assert!(!std::path::Path::new(header).exists());
    Ok(())
}
