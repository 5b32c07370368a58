/// Global uniform shared by every pipeline (group 0).
const GLOBALS: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    view: mat4x4<f32>,
    sky_inverse: mat4x4<f32>,
    camera_position: vec4<f32>,
    ambient: vec4<f32>,
    light_direction: vec4<f32>,
    light_color: vec4<f32>,
    clip_plane: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;
"#;

const MESH: &str = r#"
struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
    // x: shading mode, y: metalness, z: roughness
    material: vec4<f32>,
}

@group(1) @binding(0)
var<uniform> object: ObjectConstants;
@group(1) @binding(1)
var object_texture: texture_2d<f32>;
@group(1) @binding(2)
var object_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;
    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;
    out.normal = normalize(world_normal);
    out.uv = input.uv;
    return out;
}

fn matcap_uv(world_pos: vec3<f32>, normal: vec3<f32>) -> vec2<f32> {
    let view_pos = (globals.view * vec4<f32>(world_pos, 1.0)).xyz;
    let view_normal = normalize((globals.view * vec4<f32>(normal, 0.0)).xyz);
    let view_dir = normalize(-view_pos);
    let x = normalize(vec3<f32>(view_dir.z, 0.0, -view_dir.x));
    let y = cross(view_dir, x);
    let uv = vec2<f32>(dot(x, view_normal), dot(y, view_normal)) * 0.495 + 0.5;
    return vec2<f32>(uv.x, 1.0 - uv.y);
}

fn lit(normal: vec3<f32>, world_pos: vec3<f32>) -> vec3<f32> {
    let base = object.color.rgb;
    let metalness = object.material.y;
    let roughness = max(object.material.z, 0.04);
    let light_dir = normalize(globals.light_direction.xyz);
    let view_dir = normalize(globals.camera_position.xyz - world_pos);
    let half_dir = normalize(light_dir + view_dir);
    let n_dot_l = max(dot(normal, light_dir), 0.0);
    let shininess = 2.0 / (roughness * roughness * roughness * roughness) - 2.0;
    let specular_color = mix(vec3<f32>(0.04), base, metalness);
    let specular = specular_color * pow(max(dot(normal, half_dir), 0.0), max(shininess, 1.0)) * n_dot_l;
    let diffuse = base * (1.0 - metalness);
    return diffuse * (globals.ambient.rgb + globals.light_color.rgb * n_dot_l)
        + specular * globals.light_color.rgb;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let normal = normalize(input.normal);
    let mode = u32(object.material.x + 0.5);
    let baked = textureSample(object_texture, object_sampler, input.uv);
    let matcap = textureSample(object_texture, object_sampler, matcap_uv(input.world_pos, normal));

    var color = object.color.rgb;
    if mode == 0u {
        color = baked.rgb * object.color.rgb;
    } else if mode == 2u {
        color = lit(normal, input.world_pos);
    } else if mode == 3u {
        color = matcap.rgb * object.color.rgb;
    }

    if dot(globals.clip_plane, vec4<f32>(input.world_pos, 1.0)) < 0.0 {
        discard;
    }
    return vec4<f32>(color, object.color.a);
}
"#;

const SKY: &str = r#"
@group(1) @binding(0)
var sky_texture: texture_cube<f32>;
@group(1) @binding(1)
var sky_sampler: sampler;

struct SkyOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
}

@vertex
fn vs_sky(@builtin(vertex_index) index: u32) -> SkyOutput {
    // One triangle covering the screen.
    let x = f32(i32(index & 1u) * 4 - 1);
    let y = f32(i32(index >> 1u) * 4 - 1);
    var out: SkyOutput;
    out.position = vec4<f32>(x, y, 1.0, 1.0);
    out.ndc = vec2<f32>(x, y);
    return out;
}

@fragment
fn fs_sky(input: SkyOutput) -> @location(0) vec4<f32> {
    let far = globals.sky_inverse * vec4<f32>(input.ndc, 1.0, 1.0);
    let direction = normalize(far.xyz / far.w);
    // Cube maps are authored for a left-handed lookup.
    let color = textureSample(sky_texture, sky_sampler, vec3<f32>(-direction.x, direction.y, direction.z));
    return vec4<f32>(color.rgb, 1.0);
}
"#;

const WATER: &str = r#"
struct WaterUniform {
    model: mat4x4<f32>,
    mirror_view_proj: mat4x4<f32>,
    water_color: vec4<f32>,
    sun_color: vec4<f32>,
    sun_direction: vec4<f32>,
    // x: time, y: distortion scale, z: normal map size
    params: vec4<f32>,
}

@group(1) @binding(0)
var<uniform> water: WaterUniform;
@group(1) @binding(1)
var normal_texture: texture_2d<f32>;
@group(1) @binding(2)
var normal_sampler: sampler;
@group(1) @binding(3)
var mirror_texture: texture_2d<f32>;
@group(1) @binding(4)
var mirror_sampler: sampler;

struct WaterOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) mirror_coord: vec4<f32>,
}

@vertex
fn vs_water(@location(0) position: vec3<f32>) -> WaterOutput {
    var out: WaterOutput;
    let world_position = water.model * vec4<f32>(position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;
    out.mirror_coord = water.mirror_view_proj * world_position;
    return out;
}

fn noise(uv: vec2<f32>) -> vec4<f32> {
    let time = water.params.x;
    let uv0 = (uv / 103.0) + vec2<f32>(time / 17.0, time / 29.0);
    let uv1 = uv / 107.0 - vec2<f32>(time / -19.0, time / 31.0);
    let uv2 = uv / vec2<f32>(8907.0, 9803.0) + vec2<f32>(time / 101.0, time / 97.0);
    let uv3 = uv / vec2<f32>(1091.0, 1027.0) - vec2<f32>(time / 109.0, time / -113.0);
    let sum = textureSample(normal_texture, normal_sampler, uv0)
        + textureSample(normal_texture, normal_sampler, uv1)
        + textureSample(normal_texture, normal_sampler, uv2)
        + textureSample(normal_texture, normal_sampler, uv3);
    return sum * 0.5 - 1.0;
}

@fragment
fn fs_water(input: WaterOutput) -> @location(0) vec4<f32> {
    let sun_direction = normalize(water.sun_direction.xyz);
    let sun_color = water.sun_color.rgb;

    let n = noise(input.world_pos.xz * water.params.z);
    let surface_normal = normalize(n.xzy * vec3<f32>(1.5, 1.0, 1.5));

    let world_to_eye = globals.camera_position.xyz - input.world_pos;
    let eye_direction = normalize(world_to_eye);

    let reflection = normalize(reflect(-sun_direction, surface_normal));
    let direction = max(0.0, dot(eye_direction, reflection));
    let specular_light = pow(direction, 100.0) * sun_color * 2.0;
    let diffuse_light = max(dot(sun_direction, surface_normal), 0.0) * sun_color * 0.5;

    let distance = length(world_to_eye);
    let distortion = surface_normal.xz * (0.001 + 1.0 / distance) * water.params.y;
    let projected = input.mirror_coord.xy / input.mirror_coord.w;
    let mirror_uv = projected * vec2<f32>(0.5, -0.5) + vec2<f32>(0.5) + distortion;
    let reflection_sample = textureSample(mirror_texture, mirror_sampler, mirror_uv).rgb;

    let theta = max(dot(eye_direction, surface_normal), 0.0);
    let rf0 = 0.3;
    let reflectance = rf0 + (1.0 - rf0) * pow(1.0 - theta, 5.0);
    let scatter = max(0.0, dot(surface_normal, eye_direction)) * water.water_color.rgb;
    let albedo = mix(
        sun_color * diffuse_light * 0.3 + scatter,
        vec3<f32>(0.1) + reflection_sample * 0.9 + reflection_sample * specular_light,
        reflectance
    );
    return vec4<f32>(albedo, water.water_color.a);
}
"#;

pub(crate) fn mesh_shader() -> String {
    [GLOBALS, MESH].concat()
}

pub(crate) fn sky_shader() -> String {
    [GLOBALS, SKY].concat()
}

pub(crate) fn water_shader() -> String {
    [GLOBALS, WATER].concat()
}
