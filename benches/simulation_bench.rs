use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use impulse2d::{
    BodyDef, BodyId, Circle, PhysicsWorld, Polygon, RevoluteJoint, Vec2, WorldConfig,
};

const DT: f64 = 1.0 / 60.0;
const STEPS: usize = 30;

fn ground(world: &mut PhysicsWorld) -> BodyId {
    world
        .add_body(
            BodyDef::new(Vec2::new(0.0, -0.5))
                .with_shape(Polygon::new_box(50.0, 0.5))
                .fixed(),
        )
        .unwrap()
}

// --- Helper for creating stack benchmarks ---
fn build_box_pyramid(world: &mut PhysicsWorld, rows: usize) {
    let half = 0.5;
    for row in 0..rows {
        let count = rows - row;
        let y = half + row as f64 * (2.0 * half);
        let x0 = -(count as f64 - 1.0) * half;
        for i in 0..count {
            let x = x0 + i as f64 * (2.0 * half + 0.01);
            world
                .add_body(BodyDef::new(Vec2::new(x, y)).with_shape(Polygon::new_box(half, half)))
                .unwrap();
        }
    }
}

// --- Helper for creating chain benchmarks ---
fn build_revolute_chain(world: &mut PhysicsWorld, links: usize) {
    let link_length = 0.5;
    let anchor_pos = Vec2::new(0.0, 20.0);
    let anchor = world
        .add_body(BodyDef::new(anchor_pos).with_shape(Circle::new(0.2)).fixed())
        .unwrap();

    let mut last = anchor;
    let mut current_pos = anchor_pos;
    for i in 0..links {
        current_pos.x += link_length;
        let link = world
            .add_body(BodyDef::new(current_pos).with_shape(Circle::new(0.2)))
            .unwrap();
        let anchor_a = if i == 0 { Vec2::ZERO } else { Vec2::new(link_length / 2.0, 0.0) };
        world
            .add_joint(RevoluteJoint::new(last, link, anchor_a, Vec2::new(-link_length / 2.0, 0.0)))
            .unwrap();
        last = link;
    }
}

fn build_bullet_field(world: &mut PhysicsWorld, bullets: usize) {
    world
        .add_body(
            BodyDef::new(Vec2::new(10.0, 0.0))
                .with_shape(Polygon::new_box(0.05, 50.0))
                .fixed(),
        )
        .unwrap();
    for i in 0..bullets {
        world
            .add_body(
                BodyDef::new(Vec2::new(0.0, i as f64 * 0.5 - bullets as f64 * 0.25))
                    .with_shape(Circle::new(0.1))
                    .with_velocity(Vec2::new(300.0, 0.0)),
            )
            .unwrap();
    }
}

fn run(world: &mut PhysicsWorld) {
    for _ in 0..STEPS {
        world.step(black_box(DT));
    }
}

// Benchmark for a pyramid of boxes settling on the ground
fn bench_box_pyramid(c: &mut Criterion) {
    let mut group = c.benchmark_group("box_pyramid");

    for rows in [5, 10, 20].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, &n| {
            b.iter(|| {
                let mut world = PhysicsWorld::new(WorldConfig::default().with_iterations(4, 2));
                ground(&mut world);
                build_box_pyramid(&mut world, black_box(n));
                run(&mut world);
            });
        });
    }
    group.finish();
}

// Benchmark for a chain of bodies linked by revolute joints
fn bench_revolute_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("revolute_chain");

    for links in [10, 100, 250].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(links), links, |b, &n| {
            b.iter(|| {
                let mut world = PhysicsWorld::default();
                build_revolute_chain(&mut world, black_box(n));
                run(&mut world);
            });
        });
    }
    group.finish();
}

// Benchmark for fast bodies that need time-of-impact sub-stepping
fn bench_bullets(c: &mut Criterion) {
    let mut group = c.benchmark_group("bullets");

    for bullets in [10, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(bullets), bullets, |b, &n| {
            b.iter(|| {
                let mut world = PhysicsWorld::new(WorldConfig::zero_gravity());
                build_bullet_field(&mut world, black_box(n));
                run(&mut world);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_box_pyramid, bench_revolute_chain, bench_bullets);
criterion_main!(benches);
