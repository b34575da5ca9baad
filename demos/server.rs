use anyhow::Result;
use mooring::{
  server::{Config, Server},
  Channel, EffectTarget, Transform, TransformMirror,
};
use std::{
  collections::HashMap,
  thread,
  time::{Duration, Instant},
};

fn init_log() -> Result<()> {
  // default RUST_LOG=info
  std::env::set_var(
    "RUST_LOG",
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
  );
  Ok(env_logger::try_init()?)
}

struct Scene {
  objects: HashMap<String, (Transform, bool)>,
}

impl Scene {
  fn new() -> Self {
    let mut objects = HashMap::new();
    objects.insert("cube".to_string(), (Transform::default(), true));
    Self { objects }
  }
}

impl EffectTarget for Scene {
  fn set_transform(&mut self, name: &str, transform: &Transform) -> bool {
    match self.objects.get_mut(name) {
      Some(object) => {
        object.0 = *transform;
        true
      }
      None => false,
    }
  }

  fn set_active(&mut self, name: &str, active: bool) -> bool {
    match self.objects.get_mut(name) {
      Some(object) => {
        log::info!("{name} active = {active}");
        object.1 = active;
        true
      }
      None => false,
    }
  }
}

fn main() -> Result<()> {
  init_log()?;

  let mut server = Server::bind(Config::default())?;
  let mut scene = Scene::new();
  let mut mirror = TransformMirror::new("cube");

  const TICK: Duration = Duration::from_millis(16);
  let mut elapsed = Duration::ZERO;
  loop {
    let now = Instant::now();
    for event in server.tick(now, &mut scene)? {
      log::info!("{event:?}");
    }

    // drift the cube in a circle so clients see a live object
    elapsed += TICK;
    let t = elapsed.as_secs_f32();
    let cube = {
      let (cube, _) = scene.objects.get_mut("cube").unwrap();
      cube.position = [t.sin(), 0.0, t.cos()];
      *cube
    };
    if let Some(update) = mirror.update(TICK, &cube) {
      server.broadcast(&update, Channel::Unreliable);
    }

    thread::sleep(TICK);
  }
}
