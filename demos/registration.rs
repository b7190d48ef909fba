use ndarray::{Array3, Ix3};
use rand::SeedableRng;
use volume_transforms::fft::{fftn_real, ifftn};
use volume_transforms::{
    center_of_mass, disp3d, fourier_shift, is_translation_of, move_center_of_mass_to_center,
    phase_cross_correlation, random_unit_vector, tukey, FourierShiftOptions,
    PhaseCorrelationOptions,
};

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let shape = (48, 48, 48);

    // two gaussian blobs, off centre
    let blob = |(z, y, x): (usize, usize, usize), c: [f64; 3], sigma: f64| {
        let d2 = (z as f64 - c[0]).powi(2) + (y as f64 - c[1]).powi(2) + (x as f64 - c[2]).powi(2);
        (-d2 / (2.0 * sigma * sigma)).exp()
    };
    let volume = Array3::from_shape_fn(shape, |i| {
        blob(i, [20.0, 26.0, 18.0], 4.0) + 0.5 * blob(i, [30.0, 18.0, 28.0], 2.5)
    })
    .into_dyn();
    let window = tukey(volume.shape(), 0.3, true);
    let volume = volume * &window;

    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let shift = random_unit_vector(&mut rng, Some(3.7)).to_vec();
    println!("applied shift: {:?}", shift);

    let axes = [0, 1, 2];
    let spectrum = fftn_real(volume.view(), &axes);
    let shifted = fourier_shift(&spectrum, shift.clone(), &FourierShiftOptions::default())?;
    let moving = ifftn(shifted.view(), &axes).mapv(|c| c.re);

    let options = PhaseCorrelationOptions::default().upsample_factor(20);
    let registration = phase_cross_correlation(&volume, &moving, &options)?;
    println!("registered shift: {}", registration.shift);
    println!("moving is a translated copy: {}", is_translation_of(&volume, &moving, 1e-3, None)?);

    println!("center of mass before: {:?}", center_of_mass(&volume)?);
    let centered = move_center_of_mass_to_center(&volume, 1)?;
    println!("center of mass after: {:?}", center_of_mass(&centered)?);

    let views = [
        volume.view().into_dimensionality::<Ix3>()?,
        moving.view().into_dimensionality::<Ix3>()?,
        centered.view().into_dimensionality::<Ix3>()?,
    ];
    let figure = disp3d(&views, false)?;
    figure.save("registration.png")?;
    Ok(())
}
