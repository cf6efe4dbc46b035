fn main() {
	let Some(path) = std::env::args().nth(1) else {
		eprintln!("usage: basic <file.png>");
		std::process::exit(2);
	};
	let png = std::fs::read(&path).expect("couldn't read file");
	let header = pngload::decode_png_header(&png).expect("bad PNG");
	println!(
		"{}: bit depth {}, color type {}",
		path,
		header.bit_depth(),
		header.color_type()
	);
	let image = pngload::decode(&png).expect("bad PNG");
	println!("{}×{} image", image.width(), image.height());
	let pixels = image.pixels();
	println!(
		"top-left pixel is #{:02x}{:02x}{:02x}{:02x}",
		pixels[0], pixels[1], pixels[2], pixels[3]
	);
}
