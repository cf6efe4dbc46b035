use criterion::{criterion_group, criterion_main, Criterion};
use nanorand::{Rng, WyRand};
use std::hint::black_box;

/// RGBA test image with gradients and a little noise.
fn make_png(width: u32, height: u32) -> Vec<u8> {
	let mut samples = Vec::with_capacity(width as usize * height as usize * 4);
	let mut rng = WyRand::new_seed(0x1234_5678);
	for y in 0..height {
		for x in 0..width {
			let noise = rng.generate_range(0_u8..8);
			samples.extend_from_slice(&[
				(x as u8) ^ noise,
				(y as u8) ^ noise,
				((x + y) as u8) ^ noise,
				255 - noise,
			]);
		}
	}
	let mut out = Vec::new();
	{
		let mut encoder = png::Encoder::new(&mut out, width, height);
		encoder.set_color(png::ColorType::Rgba);
		encoder.set_depth(png::BitDepth::Eight);
		encoder.set_adaptive_filter(png::AdaptiveFilterType::Adaptive);
		let mut writer = encoder.write_header().unwrap();
		writer.write_image_data(&samples).unwrap();
	}
	out
}

fn run_benches(c: &mut Criterion) {
	let large_image = black_box(make_png(1024, 768));
	let small_image = black_box(make_png(64, 64));

	for (name, image, samples) in [
		("large-image", &large_image, 50),
		("small-image", &small_image, 1000),
	] {
		let mut group = c.benchmark_group(name);
		group.sample_size(samples);

		group.bench_function("pngload", |b| {
			b.iter(|| {
				let data = pngload::decode(&image[..]).unwrap();
				std::hint::black_box(data);
			})
		});

		group.bench_function("png", |b| {
			b.iter(|| {
				let decoder = png::Decoder::new(&image[..]);
				let mut reader = decoder.read_info().unwrap();
				let mut png_buf = vec![0; reader.output_buffer_size()];
				reader.next_frame(&mut png_buf).unwrap();
				std::hint::black_box(png_buf);
			})
		});
		group.finish();
	}
}

criterion_group!(benches, run_benches);
criterion_main!(benches);
